use exam_seating::assignment::{
    AlgorithmConfig, Assignment, AssignmentRegistry, Candidate, DirectoryError, Exam, ExamId,
    FileAssignmentRegistry, InMemoryAssignmentRegistry, RegistryError, Room, RoomId,
    StaticCatalog,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Registry backend chosen at startup.
pub(crate) enum SeatingRegistry {
    Memory(InMemoryAssignmentRegistry),
    File(FileAssignmentRegistry),
}

impl SeatingRegistry {
    /// File-backed when a path is configured, in-memory otherwise.
    pub(crate) fn open(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(path) => FileAssignmentRegistry::open(path).map(Self::File),
            None => Ok(Self::Memory(InMemoryAssignmentRegistry::new())),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Memory(_) => "in-memory".to_string(),
            Self::File(registry) => registry.path().display().to_string(),
        }
    }
}

impl AssignmentRegistry for SeatingRegistry {
    fn insert(&self, assignment: &Assignment) -> Result<(), RegistryError> {
        match self {
            Self::Memory(registry) => registry.insert(assignment),
            Self::File(registry) => registry.insert(assignment),
        }
    }

    fn remove(&self, room_id: &RoomId, exam_id: &ExamId) -> Result<(), RegistryError> {
        match self {
            Self::Memory(registry) => registry.remove(room_id, exam_id),
            Self::File(registry) => registry.remove(room_id, exam_id),
        }
    }

    fn clear(&self) -> Result<usize, RegistryError> {
        match self {
            Self::Memory(registry) => registry.clear(),
            Self::File(registry) => registry.clear(),
        }
    }

    fn list(&self) -> Result<Vec<Assignment>, RegistryError> {
        match self {
            Self::Memory(registry) => registry.list(),
            Self::File(registry) => registry.list(),
        }
    }
}

/// Seed file when configured, the built-in demo catalog otherwise.
pub(crate) fn load_catalog(seed_path: Option<&Path>) -> Result<StaticCatalog, DirectoryError> {
    match seed_path {
        Some(path) => StaticCatalog::from_path(path),
        None => Ok(demo_catalog()),
    }
}

pub(crate) fn demo_catalog() -> StaticCatalog {
    StaticCatalog::new(
        vec![
            Exam::new("exam-cs101", "CS101", "Introduction to Programming", 50),
            Exam::new("exam-ma201", "MA201", "Linear Algebra", 120),
            Exam::new("exam-hi110", "HI110", "World History", 8).with_roster(vec![
                Candidate::new("stu-1001", "Okafor", "Chidi").in_department("History"),
                Candidate::new("stu-1002", "Adams", "Grace").in_department("Economics"),
                Candidate::new("stu-1003", "Zhang", "Wei").in_department("History"),
                Candidate::new("stu-1004", "Baker", "Lena").in_department("Economics"),
                Candidate::new("stu-1005", "Novak", "Petra").in_department("History"),
                Candidate::new("stu-1006", "Chen", "Li"),
                Candidate::new("stu-1007", "Diaz", "Rosa").in_department("History"),
                Candidate::new("stu-1008", "Ito", "Ken").in_department("Economics"),
            ]),
        ],
        vec![
            Room::new("room-101", "101", 80).in_building("Science Hall"),
            Room::new("room-102", "102", 80).in_building("Science Hall"),
            Room::new("room-201", "201", 40).in_building("Humanities"),
            Room::new("room-205", "205", 5).in_building("Humanities"),
            Room::new("room-aud", "Auditorium", 250).in_building("Main"),
            Room::new("room-310", "310", 60)
                .in_building("Science Hall")
                .inactive(),
        ],
        vec![
            AlgorithmConfig::new("alg-round-robin", "Round robin", "round_robin"),
            AlgorithmConfig::new("alg-alpha", "Alphabetical by surname", "alphabetical_grouping")
                .with_rules(&["sort_by_surname", "contiguous_ranges"]),
            AlgorithmConfig::new("alg-best-fit", "Best room fit", "capacity_optimization")
                .with_rules(&["minimize_wasted_seats"]),
            AlgorithmConfig::new("alg-department", "Group by department", "department_grouping")
                .with_rules(&["keep_departments_together"]),
        ],
    )
}
