use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Duration;
use serde_json::Value;

use crate::assignment::directory::{
    AlgorithmDirectory, DirectoryError, ExamDirectory, RoomDirectory,
};
use crate::assignment::domain::{
    AlgorithmId, Assignment, Candidate, Exam, ExamId, Room, RoomFilter, RoomId,
};
use crate::assignment::registry::{AssignmentRegistry, InMemoryAssignmentRegistry, RegistryError};
use crate::assignment::strategy::{AlgorithmConfig, StrategyKind};
use crate::assignment::{assignment_router, AssignmentService, StaticCatalog};
use crate::config::SeatingConfig;

pub(super) const SMALL_EXAM: &str = "exam-cs101";
pub(super) const LARGE_EXAM: &str = "exam-ma201";
pub(super) const ROSTER_EXAM: &str = "exam-hi110";

pub(super) fn roster() -> Vec<Candidate> {
    vec![
        Candidate::new("s-1", "Zhang", "Wei").in_department("Physics"),
        Candidate::new("s-2", "Adams", "Grace").in_department("Mathematics"),
        Candidate::new("s-3", "Okafor", "Chidi").in_department("Physics"),
        Candidate::new("s-4", "Baker", "Lena").in_department("Mathematics"),
        Candidate::new("s-5", "Chen", "Li").in_department("Physics"),
        Candidate::new("s-6", "Diaz", "Rosa"),
    ]
}

pub(super) fn catalog() -> StaticCatalog {
    StaticCatalog::new(
        vec![
            Exam::new(SMALL_EXAM, "CS101", "Intro to Programming", 50),
            Exam::new(LARGE_EXAM, "MA201", "Linear Algebra", 120),
            Exam::new(ROSTER_EXAM, "HI110", "World History", 6).with_roster(roster()),
        ],
        vec![
            Room::new("r-101", "101", 80).in_building("Science"),
            Room::new("r-102", "102", 80).in_building("Science"),
            Room::new("r-201", "201", 40).in_building("Arts"),
            Room::new("r-050", "50", 4).in_building("Arts"),
            Room::new("r-annex", "Annex", 55),
            Room::new("r-closed", "300", 120).inactive(),
        ],
        vec![
            AlgorithmConfig::new("alg-rr", "Round robin", "round_robin"),
            AlgorithmConfig::new("alg-alpha", "Alphabetical", "alphabetical_grouping")
                .with_rules(&["sort_by_surname"]),
            AlgorithmConfig::new("alg-cap", "Best fit", "capacity_optimization"),
            AlgorithmConfig::new("alg-dept", "By department", "department_grouping"),
            AlgorithmConfig::new("alg-bogus", "Genetic", "genetic_search"),
        ],
    )
}

pub(super) fn seating_config() -> SeatingConfig {
    SeatingConfig::default()
}

/// Every staged assignment is already expired when read back.
pub(super) fn expiring_config() -> SeatingConfig {
    SeatingConfig {
        pending_ttl: Some(Duration::zero()),
        ..SeatingConfig::default()
    }
}

pub(super) type MemoryService = AssignmentService<StaticCatalog, InMemoryAssignmentRegistry>;

pub(super) fn build_service() -> (MemoryService, Arc<InMemoryAssignmentRegistry>) {
    build_service_with(seating_config())
}

pub(super) fn build_service_with(
    config: SeatingConfig,
) -> (MemoryService, Arc<InMemoryAssignmentRegistry>) {
    let registry = Arc::new(InMemoryAssignmentRegistry::new());
    let service = AssignmentService::new(Arc::new(catalog()), registry.clone(), &config)
        .expect("in-memory registry lists");
    (service, registry)
}

pub(super) fn exam(id: &str) -> ExamId {
    ExamId::from(id)
}

pub(super) fn room(id: &str) -> RoomId {
    RoomId::from(id)
}

/// Registry that accepts reads but refuses every write.
pub(super) struct UnavailableRegistry;

impl AssignmentRegistry for UnavailableRegistry {
    fn insert(&self, _assignment: &Assignment) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn remove(&self, _room_id: &RoomId, _exam_id: &ExamId) -> Result<(), RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn clear(&self) -> Result<usize, RegistryError> {
        Err(RegistryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Assignment>, RegistryError> {
        Ok(Vec::new())
    }
}

pub(super) fn unavailable_service() -> AssignmentService<StaticCatalog, UnavailableRegistry> {
    AssignmentService::new(
        Arc::new(catalog()),
        Arc::new(UnavailableRegistry),
        &seating_config(),
    )
    .expect("listing succeeds")
}

/// Catalog whose exam enrollments can be revised between calls.
pub(super) struct RevisableCatalog {
    inner: Mutex<StaticCatalog>,
}

impl RevisableCatalog {
    pub(super) fn new(catalog: StaticCatalog) -> Self {
        Self {
            inner: Mutex::new(catalog),
        }
    }

    pub(super) fn set_total(&self, id: &str, total: u32) {
        let mut guard = self.inner.lock().expect("catalog mutex poisoned");
        for exam in guard.exams.iter_mut().filter(|exam| exam.id.0 == id) {
            exam.total_enrollment = total;
            exam.remaining_enrollment = total;
        }
    }
}

impl ExamDirectory for RevisableCatalog {
    fn list_upcoming_exams(&self) -> Result<Vec<Exam>, DirectoryError> {
        self.inner
            .lock()
            .expect("catalog mutex poisoned")
            .list_upcoming_exams()
    }

    fn exam(&self, id: &ExamId) -> Result<Option<Exam>, DirectoryError> {
        self.inner.lock().expect("catalog mutex poisoned").exam(id)
    }
}

impl RoomDirectory for RevisableCatalog {
    fn list_active_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, DirectoryError> {
        self.inner
            .lock()
            .expect("catalog mutex poisoned")
            .list_active_rooms(filter)
    }

    fn room(&self, id: &RoomId) -> Result<Option<Room>, DirectoryError> {
        self.inner.lock().expect("catalog mutex poisoned").room(id)
    }
}

impl AlgorithmDirectory for RevisableCatalog {
    fn get_algorithm(&self, id: &AlgorithmId) -> Result<Option<AlgorithmConfig>, DirectoryError> {
        self.inner
            .lock()
            .expect("catalog mutex poisoned")
            .get_algorithm(id)
    }
}

/// A committed record as an earlier process would have persisted it.
pub(super) fn persisted_assignment(exam_id: &str, room_id: &str, count: u32) -> Assignment {
    Assignment {
        exam_id: ExamId::from(exam_id),
        room_id: RoomId::from(room_id),
        count,
        students: Vec::new(),
        groups: Vec::new(),
        algorithm_id: AlgorithmId::from("alg-rr"),
        strategy: StrategyKind::RoundRobin,
        rules: Vec::new(),
        created_at: chrono::Utc::now(),
    }
}

pub(super) fn assignment_router_with_service(service: MemoryService) -> axum::Router {
    assignment_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
