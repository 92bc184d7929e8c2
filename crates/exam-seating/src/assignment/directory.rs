use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::domain::{AlgorithmId, Exam, ExamId, Room, RoomFilter, RoomId};
use super::strategy::AlgorithmConfig;

/// Exam scheduling collaborator. Returns every upcoming exam; the orchestrator overlays its
/// own remaining-enrollment counters and filters out fully assigned exams.
pub trait ExamDirectory: Send + Sync {
    fn list_upcoming_exams(&self) -> Result<Vec<Exam>, DirectoryError>;
    fn exam(&self, id: &ExamId) -> Result<Option<Exam>, DirectoryError>;
}

/// Room directory collaborator.
pub trait RoomDirectory: Send + Sync {
    fn list_active_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, DirectoryError>;
    /// Looks up a room regardless of status.
    fn room(&self, id: &RoomId) -> Result<Option<Room>, DirectoryError>;
}

/// Algorithm template store.
pub trait AlgorithmDirectory: Send + Sync {
    fn get_algorithm(&self, id: &AlgorithmId) -> Result<Option<AlgorithmConfig>, DirectoryError>;
}

/// Everything the orchestrator reads from outside.
pub trait Catalog: ExamDirectory + RoomDirectory + AlgorithmDirectory {}

impl<T> Catalog for T where T: ExamDirectory + RoomDirectory + AlgorithmDirectory {}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error("invalid seed data: {0}")]
    InvalidSeed(String),
}

/// Fixed catalog loaded once, from a JSON seed file or built in code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub exams: Vec<Exam>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
}

impl StaticCatalog {
    pub fn new(exams: Vec<Exam>, rooms: Vec<Room>, algorithms: Vec<AlgorithmConfig>) -> Self {
        Self {
            exams,
            rooms,
            algorithms,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|err| DirectoryError::Unavailable(format!("{}: {err}", path.display())))?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, DirectoryError> {
        let catalog: StaticCatalog = serde_json::from_slice(bytes)
            .map_err(|err| DirectoryError::InvalidSeed(err.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rejects duplicate ids, seatless rooms, and rosters longer than the enrollment.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        let mut exam_ids = HashSet::new();
        for exam in &self.exams {
            if !exam_ids.insert(&exam.id) {
                return Err(DirectoryError::InvalidSeed(format!(
                    "duplicate exam id {}",
                    exam.id
                )));
            }
            if exam.roster.len() > exam.total_enrollment as usize {
                return Err(DirectoryError::InvalidSeed(format!(
                    "exam {} lists {} candidates but enrolls {}",
                    exam.id,
                    exam.roster.len(),
                    exam.total_enrollment
                )));
            }
        }

        let mut room_ids = HashSet::new();
        for room in &self.rooms {
            if !room_ids.insert(&room.id) {
                return Err(DirectoryError::InvalidSeed(format!(
                    "duplicate room id {}",
                    room.id
                )));
            }
            if room.capacity == 0 {
                return Err(DirectoryError::InvalidSeed(format!(
                    "room {} has no seats",
                    room.id
                )));
            }
        }

        let mut algorithm_ids = HashSet::new();
        for algorithm in &self.algorithms {
            if !algorithm_ids.insert(&algorithm.id) {
                return Err(DirectoryError::InvalidSeed(format!(
                    "duplicate algorithm id {}",
                    algorithm.id
                )));
            }
        }

        Ok(())
    }
}

impl ExamDirectory for StaticCatalog {
    fn list_upcoming_exams(&self) -> Result<Vec<Exam>, DirectoryError> {
        Ok(self.exams.clone())
    }

    fn exam(&self, id: &ExamId) -> Result<Option<Exam>, DirectoryError> {
        Ok(self.exams.iter().find(|exam| &exam.id == id).cloned())
    }
}

impl RoomDirectory for StaticCatalog {
    fn list_active_rooms(&self, filter: &RoomFilter) -> Result<Vec<Room>, DirectoryError> {
        Ok(self
            .rooms
            .iter()
            .filter(|room| filter.matches(room))
            .cloned()
            .collect())
    }

    fn room(&self, id: &RoomId) -> Result<Option<Room>, DirectoryError> {
        Ok(self.rooms.iter().find(|room| &room.id == id).cloned())
    }
}

impl AlgorithmDirectory for StaticCatalog {
    fn get_algorithm(&self, id: &AlgorithmId) -> Result<Option<AlgorithmConfig>, DirectoryError> {
        Ok(self
            .algorithms
            .iter()
            .find(|algorithm| &algorithm.id == id)
            .cloned())
    }
}
