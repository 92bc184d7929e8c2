use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use super::domain::{Assignment, ExamId, Room, RoomId, StudentId};

/// Per-room occupancy derived from committed assignments.
///
/// Capacity is never decremented in place: remaining seats are always recomputed as
/// `capacity - committed`. A room holds at most one assignment until it is released.
#[derive(Debug, Default, Clone)]
pub struct RoomCapacityLedger {
    capacities: BTreeMap<RoomId, u32>,
    active: BTreeMap<RoomId, Assignment>,
}

impl RoomCapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the ledger from previously persisted assignments. A hydrated room's capacity
    /// falls back to its committed count until the room directory registers it.
    pub fn hydrate(assignments: impl IntoIterator<Item = Assignment>) -> Self {
        let mut ledger = Self::new();
        for assignment in assignments {
            ledger
                .capacities
                .entry(assignment.room_id.clone())
                .or_insert(assignment.count);
            ledger.active.insert(assignment.room_id.clone(), assignment);
        }
        ledger
    }

    /// Records the latest known capacity for a room.
    pub fn register_room(&mut self, room: &Room) {
        self.capacities.insert(room.id.clone(), room.capacity);
    }

    pub fn is_occupied(&self, room_id: &RoomId) -> bool {
        self.active.contains_key(room_id)
    }

    pub fn occupant(&self, room_id: &RoomId) -> Option<&Assignment> {
        self.active.get(room_id)
    }

    pub fn reserve(&mut self, assignment: Assignment) -> Result<(), LedgerError> {
        let room_id = assignment.room_id.clone();
        if let Some(existing) = self.active.get(&room_id) {
            return Err(LedgerError::RoomOccupied {
                room_id,
                exam_id: existing.exam_id.clone(),
            });
        }

        let capacity = *self
            .capacities
            .get(&room_id)
            .ok_or_else(|| LedgerError::UnknownRoom(room_id.clone()))?;

        if assignment.count == 0 {
            return Err(LedgerError::EmptyAssignment(room_id));
        }
        if assignment.count > capacity {
            return Err(LedgerError::CapacityExceeded {
                room_id,
                requested: assignment.count,
                capacity,
            });
        }

        self.active.insert(room_id, assignment);
        Ok(())
    }

    pub fn release(&mut self, room_id: &RoomId, exam_id: &ExamId) -> Result<Assignment, LedgerError> {
        match self.active.entry(room_id.clone()) {
            Entry::Occupied(entry) if &entry.get().exam_id == exam_id => Ok(entry.remove()),
            _ => Err(LedgerError::NotFound {
                room_id: room_id.clone(),
                exam_id: exam_id.clone(),
            }),
        }
    }

    /// Removes every assignment, returning how many were active.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.active.len();
        self.active.clear();
        removed
    }

    /// `None` when the room has never been registered.
    pub fn remaining_capacity(&self, room_id: &RoomId) -> Option<u32> {
        let capacity = *self.capacities.get(room_id)?;
        Some(capacity.saturating_sub(self.committed_in_room(room_id)))
    }

    pub fn committed_in_room(&self, room_id: &RoomId) -> u32 {
        self.active
            .get(room_id)
            .map(|assignment| assignment.count)
            .unwrap_or(0)
    }

    pub fn committed_for_exam(&self, exam_id: &ExamId) -> u32 {
        self.assignments_for_exam(exam_id)
            .map(|assignment| assignment.count)
            .sum()
    }

    pub fn placed_students(&self, exam_id: &ExamId) -> HashSet<StudentId> {
        self.assignments_for_exam(exam_id)
            .flat_map(|assignment| assignment.students.iter().cloned())
            .collect()
    }

    pub fn assignments_for_exam<'a>(
        &'a self,
        exam_id: &'a ExamId,
    ) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.active
            .values()
            .filter(move |assignment| &assignment.exam_id == exam_id)
    }

    /// Active assignments ordered by room id.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.active.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("room {room_id} is already assigned to exam {exam_id}")]
    RoomOccupied { room_id: RoomId, exam_id: ExamId },
    #[error("room {room_id} seats {capacity}, cannot place {requested}")]
    CapacityExceeded {
        room_id: RoomId,
        requested: u32,
        capacity: u32,
    },
    #[error("assignment to room {0} places no candidates")]
    EmptyAssignment(RoomId),
    #[error("room {0} is not registered with the ledger")]
    UnknownRoom(RoomId),
    #[error("no assignment of exam {exam_id} in room {room_id}")]
    NotFound { room_id: RoomId, exam_id: ExamId },
}
