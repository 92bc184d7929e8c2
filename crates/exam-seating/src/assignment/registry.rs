use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::domain::{Assignment, ExamId, RoomId};

/// Durable record of committed assignments.
///
/// The orchestrator is the only writer and calls these while holding its state lock, so
/// implementations need not coordinate concurrent writers beyond their own interior locking.
pub trait AssignmentRegistry: Send + Sync {
    fn insert(&self, assignment: &Assignment) -> Result<(), RegistryError>;
    fn remove(&self, room_id: &RoomId, exam_id: &ExamId) -> Result<(), RegistryError>;
    /// Removes everything, returning how many records were dropped.
    fn clear(&self) -> Result<usize, RegistryError>;
    fn list(&self) -> Result<Vec<Assignment>, RegistryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("room {0} already has a recorded assignment")]
    Conflict(RoomId),
    #[error("no recorded assignment of exam {exam_id} in room {room_id}")]
    NotFound { room_id: RoomId, exam_id: ExamId },
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

type Records = BTreeMap<RoomId, Assignment>;

fn lock(records: &Mutex<Records>) -> Result<MutexGuard<'_, Records>, RegistryError> {
    records
        .lock()
        .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
}

fn insert_record(records: &mut Records, assignment: &Assignment) -> Result<(), RegistryError> {
    if records.contains_key(&assignment.room_id) {
        return Err(RegistryError::Conflict(assignment.room_id.clone()));
    }
    records.insert(assignment.room_id.clone(), assignment.clone());
    Ok(())
}

fn remove_record(
    records: &mut Records,
    room_id: &RoomId,
    exam_id: &ExamId,
) -> Result<Assignment, RegistryError> {
    match records.get(room_id) {
        Some(existing) if &existing.exam_id == exam_id => records
            .remove(room_id)
            .ok_or_else(|| RegistryError::Unavailable("record vanished".to_string())),
        _ => Err(RegistryError::NotFound {
            room_id: room_id.clone(),
            exam_id: exam_id.clone(),
        }),
    }
}

/// Process-local registry; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryAssignmentRegistry {
    records: Mutex<Records>,
}

impl InMemoryAssignmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentRegistry for InMemoryAssignmentRegistry {
    fn insert(&self, assignment: &Assignment) -> Result<(), RegistryError> {
        insert_record(&mut *lock(&self.records)?, assignment)
    }

    fn remove(&self, room_id: &RoomId, exam_id: &ExamId) -> Result<(), RegistryError> {
        remove_record(&mut *lock(&self.records)?, room_id, exam_id).map(|_| ())
    }

    fn clear(&self) -> Result<usize, RegistryError> {
        let mut guard = lock(&self.records)?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<Assignment>, RegistryError> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    assignments: Vec<Assignment>,
}

/// JSON-file registry. Every mutation rewrites the snapshot through a temporary file and an
/// atomic rename; a failed write leaves both the file and the in-memory view unchanged.
#[derive(Debug)]
pub struct FileAssignmentRegistry {
    path: PathBuf,
    records: Mutex<Records>,
}

impl FileAssignmentRegistry {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|err| {
                RegistryError::Unavailable(format!("corrupt registry {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => return Err(io_unavailable(&path, err)),
        };

        let mut records = Records::new();
        for assignment in snapshot.assignments {
            insert_record(&mut records, &assignment)?;
        }

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &Records) -> Result<(), RegistryError> {
        let snapshot = Snapshot {
            assignments: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| RegistryError::Unavailable(err.to_string()))?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(|err| io_unavailable(&staging, err))?;
        fs::rename(&staging, &self.path).map_err(|err| io_unavailable(&self.path, err))
    }

    /// Applies `change` to a copy of the records, persists it, then swaps it in.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Records) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut guard = lock(&self.records)?;
        let mut next = guard.clone();
        let value = change(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(value)
    }
}

fn io_unavailable(path: &Path, err: io::Error) -> RegistryError {
    RegistryError::Unavailable(format!("{}: {err}", path.display()))
}

impl AssignmentRegistry for FileAssignmentRegistry {
    fn insert(&self, assignment: &Assignment) -> Result<(), RegistryError> {
        self.mutate(|records| insert_record(records, assignment))
    }

    fn remove(&self, room_id: &RoomId, exam_id: &ExamId) -> Result<(), RegistryError> {
        self.mutate(|records| remove_record(records, room_id, exam_id).map(|_| ()))
    }

    fn clear(&self) -> Result<usize, RegistryError> {
        self.mutate(|records| {
            let removed = records.len();
            records.clear();
            Ok(removed)
        })
    }

    fn list(&self) -> Result<Vec<Assignment>, RegistryError> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}
