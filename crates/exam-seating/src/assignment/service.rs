use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::directory::{Catalog, DirectoryError};
use super::domain::{
    AlgorithmId, AssignOutcome, Assignment, Candidate, Exam, ExamId, PendingAssignment,
    PendingToken, Room, RoomFilter, RoomId, RoomOccupancyView, RoomSuggestion,
};
use super::ledger::{LedgerError, RoomCapacityLedger};
use super::registry::{AssignmentRegistry, RegistryError};
use super::strategy::{ResolvedStrategy, StrategyError};
use crate::config::SeatingConfig;

static PENDING_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_pending_token() -> PendingToken {
    let id = PENDING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PendingToken(format!("pending-{id:06}"))
}

#[derive(Debug, Clone, Copy)]
struct EnrollmentCounter {
    total: u32,
    remaining: u32,
}

/// Everything guarded by the single assignment lock.
#[derive(Debug, Default)]
struct AssignmentState {
    ledger: RoomCapacityLedger,
    enrollment: HashMap<ExamId, EnrollmentCounter>,
    pending: Option<PendingAssignment>,
}

impl AssignmentState {
    /// Live remaining enrollment, initialised on first sight as `total - committed`. A changed
    /// directory total re-derives the counter from the new total.
    fn remaining_for(&mut self, exam: &Exam) -> u32 {
        let committed = self.ledger.committed_for_exam(&exam.id);
        let counter = self
            .enrollment
            .entry(exam.id.clone())
            .or_insert(EnrollmentCounter {
                total: exam.total_enrollment,
                remaining: exam.total_enrollment.saturating_sub(committed),
            });
        if counter.total != exam.total_enrollment {
            counter.total = exam.total_enrollment;
            counter.remaining = exam.total_enrollment.saturating_sub(committed);
        }
        counter.remaining
    }

    fn unplaced(&self, exam: &Exam) -> Vec<Candidate> {
        let placed = self.ledger.placed_students(&exam.id);
        exam.roster
            .iter()
            .filter(|candidate| !placed.contains(&candidate.student_id))
            .cloned()
            .collect()
    }

    fn restore(&mut self, exam_id: &ExamId, count: u32) {
        if let Some(counter) = self.enrollment.get_mut(exam_id) {
            counter.remaining = counter.remaining.saturating_add(count).min(counter.total);
        }
    }
}

/// How an already occupied room is reported by `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OccupancyCheck {
    /// Single-call assign: the caller picked an occupied room.
    Policy,
    /// Confirm of a staged drop: the room was free at stage time.
    Revalidate,
}

/// Stage/confirm orchestrator owning the capacity ledger, enrollment counters and the pending
/// slot. All mutations run under one lock; directory lookups happen before it is taken.
pub struct AssignmentService<C, R> {
    catalog: Arc<C>,
    registry: Arc<R>,
    pending_ttl: Option<Duration>,
    state: Mutex<AssignmentState>,
}

impl<C, R> AssignmentService<C, R>
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    /// Builds the service and hydrates the ledger from the registry.
    pub fn new(
        catalog: Arc<C>,
        registry: Arc<R>,
        config: &SeatingConfig,
    ) -> Result<Self, RegistryError> {
        let committed = registry.list()?;
        if !committed.is_empty() {
            info!(
                assignments = committed.len(),
                "restored committed assignments"
            );
        }

        Ok(Self {
            catalog,
            registry,
            pending_ttl: config.pending_ttl,
            state: Mutex::new(AssignmentState {
                ledger: RoomCapacityLedger::hydrate(committed),
                ..AssignmentState::default()
            }),
        })
    }

    /// Stages a drop without touching the ledger.
    pub fn stage(
        &self,
        exam_id: &ExamId,
        room_id: &RoomId,
        proposed_count: Option<u32>,
    ) -> Result<PendingAssignment, AssignmentError> {
        let exam = self.load_exam(exam_id)?;
        let room = self.load_room(room_id)?;

        let mut state = self.lock_state()?;
        let now = Utc::now();
        if let Some(existing) = &state.pending {
            if !self.is_expired(existing, now) {
                return Err(AssignmentError::PendingConflict(existing.token.clone()));
            }
            info!(token = %existing.token, "discarding expired pending assignment");
            state.pending = None;
        }

        if let Some(occupant) = state.ledger.occupant(&room.id) {
            return Err(AssignmentError::RoomOccupied {
                room_id: room.id.clone(),
                exam_id: occupant.exam_id.clone(),
            });
        }

        let remaining = state.remaining_for(&exam);
        if remaining == 0 {
            return Err(AssignmentError::NothingToAssign(exam.id));
        }

        let proposed_count = match proposed_count {
            None => remaining.min(room.capacity),
            Some(0) => {
                return Err(AssignmentError::InvalidCount {
                    proposed: 0,
                    reason: "at least one candidate must be placed".to_string(),
                })
            }
            Some(count) if count > room.capacity => {
                return Err(AssignmentError::CapacityExceeded {
                    room_id: room.id,
                    requested: count,
                    capacity: room.capacity,
                })
            }
            Some(count) if count > remaining => {
                return Err(AssignmentError::InvalidCount {
                    proposed: count,
                    reason: format!("only {remaining} candidates remain unassigned"),
                })
            }
            Some(count) => count,
        };

        let pending = PendingAssignment {
            token: next_pending_token(),
            exam_id: exam.id,
            room_id: room.id,
            proposed_count,
            staged_at: now,
        };
        info!(
            token = %pending.token,
            exam_id = %pending.exam_id,
            room_id = %pending.room_id,
            proposed_count,
            "assignment staged"
        );
        state.pending = Some(pending.clone());
        Ok(pending)
    }

    /// Commits the staged drop identified by `token`. Every failure leaves the pending
    /// assignment in place so the caller can retry or cancel.
    pub fn confirm(
        &self,
        token: &PendingToken,
        algorithm_id: &AlgorithmId,
    ) -> Result<AssignOutcome, AssignmentError> {
        let pending = {
            let mut state = self.lock_state()?;
            self.current_pending(&mut state, token)?
        };

        let strategy = self.resolve_algorithm(algorithm_id)?;
        let exam = self.load_exam(&pending.exam_id)?;
        let room = self.load_room(&pending.room_id)?;

        let mut state = self.lock_state()?;
        self.current_pending(&mut state, token)?;

        let result = self.commit(&mut state, &exam, &room, &strategy, OccupancyCheck::Revalidate);
        match &result {
            Ok(_) => state.pending = None,
            Err(err) => warn!(
                token = %token,
                exam_id = %exam.id,
                room_id = %room.id,
                error = %err,
                "confirm rejected; pending assignment kept"
            ),
        }
        result
    }

    /// Discards the staged drop identified by `token`.
    pub fn cancel(&self, token: &PendingToken) -> Result<PendingAssignment, AssignmentError> {
        let mut state = self.lock_state()?;
        self.current_pending(&mut state, token)?;
        let pending = state
            .pending
            .take()
            .ok_or_else(|| AssignmentError::PendingNotFound(token.clone()))?;
        info!(token = %pending.token, "pending assignment cancelled");
        Ok(pending)
    }

    /// Stage and confirm in one step, without occupying the pending slot.
    pub fn assign(
        &self,
        exam_id: &ExamId,
        room_id: &RoomId,
        algorithm_id: &AlgorithmId,
    ) -> Result<AssignOutcome, AssignmentError> {
        let strategy = self.resolve_algorithm(algorithm_id)?;
        let exam = self.load_exam(exam_id)?;
        let room = self.load_room(room_id)?;

        let mut state = self.lock_state()?;
        self.commit(&mut state, &exam, &room, &strategy, OccupancyCheck::Policy)
    }

    /// Reverses a committed assignment and returns its seats to the exam.
    pub fn remove_assignment(
        &self,
        room_id: &RoomId,
        exam_id: &ExamId,
    ) -> Result<Assignment, AssignmentError> {
        let mut state = self.lock_state()?;
        let held = state
            .ledger
            .occupant(room_id)
            .map(|assignment| &assignment.exam_id == exam_id)
            .unwrap_or(false);
        if !held {
            return Err(AssignmentError::AssignmentNotFound {
                room_id: room_id.clone(),
                exam_id: exam_id.clone(),
            });
        }

        self.registry.remove(room_id, exam_id)?;
        let released = state
            .ledger
            .release(room_id, exam_id)
            .map_err(AssignmentError::AssignmentFailed)?;
        state.restore(exam_id, released.count);

        info!(
            exam_id = %exam_id,
            room_id = %room_id,
            count = released.count,
            "assignment removed"
        );
        Ok(released)
    }

    /// Releases every assignment and restores every exam to its full enrollment. The registry
    /// is cleared first; if that fails nothing in memory changes.
    pub fn clear_all(&self) -> Result<usize, AssignmentError> {
        let mut state = self.lock_state()?;
        let persisted = self.registry.clear()?;
        let removed = state.ledger.clear_all();
        for counter in state.enrollment.values_mut() {
            counter.remaining = counter.total;
        }

        if persisted != removed {
            warn!(persisted, removed, "registry and ledger disagreed before clear");
        }
        info!(removed, "all assignments cleared");
        Ok(removed)
    }

    /// Upcoming exams that still have candidates without a seat.
    pub fn assignable_exams(&self) -> Result<Vec<Exam>, AssignmentError> {
        let exams = self.catalog.list_upcoming_exams()?;
        let mut state = self.lock_state()?;
        Ok(exams
            .into_iter()
            .filter_map(|mut exam| {
                exam.remaining_enrollment = state.remaining_for(&exam);
                (exam.remaining_enrollment > 0).then_some(exam)
            })
            .collect())
    }

    /// One exam with its live remaining enrollment.
    pub fn exam(&self, exam_id: &ExamId) -> Result<Exam, AssignmentError> {
        let mut exam = self.load_exam(exam_id)?;
        let mut state = self.lock_state()?;
        exam.remaining_enrollment = state.remaining_for(&exam);
        Ok(exam)
    }

    /// Active rooms matching `filter`, with committed occupancy.
    pub fn rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomOccupancyView>, AssignmentError> {
        let mut rooms = self.catalog.list_active_rooms(filter)?;
        rooms.sort_by(|a, b| a.number_key().cmp(&b.number_key()));

        let mut state = self.lock_state()?;
        Ok(rooms
            .into_iter()
            .map(|room| {
                state.ledger.register_room(&room);
                RoomOccupancyView {
                    occupied_by: state
                        .ledger
                        .occupant(&room.id)
                        .map(|assignment| assignment.exam_id.clone()),
                    committed: state.ledger.committed_in_room(&room.id),
                    remaining_capacity: state
                        .ledger
                        .remaining_capacity(&room.id)
                        .unwrap_or(room.capacity),
                    room,
                }
            })
            .collect())
    }

    pub fn assignments(&self) -> Result<Vec<Assignment>, AssignmentError> {
        Ok(self.lock_state()?.ledger.assignments())
    }

    /// The staged drop, if one is live.
    pub fn pending(&self) -> Result<Option<PendingAssignment>, AssignmentError> {
        let state = self.lock_state()?;
        let now = Utc::now();
        Ok(state
            .pending
            .as_ref()
            .filter(|pending| !self.is_expired(pending, now))
            .cloned())
    }

    /// Unoccupied active rooms ranked for `exam_id` by the algorithm's strategy.
    pub fn suggest_rooms(
        &self,
        exam_id: &ExamId,
        algorithm_id: &AlgorithmId,
    ) -> Result<Vec<RoomSuggestion>, AssignmentError> {
        let strategy = self.resolve_algorithm(algorithm_id)?;
        let exam = self.load_exam(exam_id)?;
        let rooms = self.catalog.list_active_rooms(&RoomFilter::default())?;

        let mut state = self.lock_state()?;
        let remaining = state.remaining_for(&exam);
        if remaining == 0 {
            return Err(AssignmentError::NothingToAssign(exam.id));
        }
        let free: Vec<Room> = rooms
            .into_iter()
            .filter(|room| !state.ledger.is_occupied(&room.id))
            .collect();
        Ok(strategy.suggest(remaining, free))
    }

    fn commit(
        &self,
        state: &mut AssignmentState,
        exam: &Exam,
        room: &Room,
        strategy: &ResolvedStrategy,
        check: OccupancyCheck,
    ) -> Result<AssignOutcome, AssignmentError> {
        state.ledger.register_room(room);

        if let Some(occupant) = state.ledger.occupant(&room.id) {
            let room_id = room.id.clone();
            let exam_id = occupant.exam_id.clone();
            return Err(match check {
                OccupancyCheck::Policy => AssignmentError::RoomOccupied { room_id, exam_id },
                OccupancyCheck::Revalidate => AssignmentError::ConcurrentModification(format!(
                    "room {room_id} was assigned to exam {exam_id} after staging"
                )),
            });
        }

        let remaining = state.remaining_for(exam);
        if remaining == 0 {
            return Err(match check {
                OccupancyCheck::Policy => AssignmentError::NothingToAssign(exam.id.clone()),
                OccupancyCheck::Revalidate => AssignmentError::ConcurrentModification(format!(
                    "exam {} was fully assigned after staging",
                    exam.id
                )),
            });
        }

        let placement = strategy
            .plan(remaining, state.unplaced(exam), room)
            .map_err(|err| match err {
                StrategyError::ZeroCapacity => {
                    AssignmentError::AssignmentFailed(LedgerError::CapacityExceeded {
                        room_id: room.id.clone(),
                        requested: remaining,
                        capacity: room.capacity,
                    })
                }
                StrategyError::NothingToAssign => AssignmentError::NothingToAssign(exam.id.clone()),
                StrategyError::UnknownAlgorithm(kind) => AssignmentError::UnknownAlgorithm(kind),
            })?;

        let assignment = Assignment {
            exam_id: exam.id.clone(),
            room_id: room.id.clone(),
            count: placement.assign_count,
            students: placement.students,
            groups: placement.groups,
            algorithm_id: strategy.config().id.clone(),
            strategy: strategy.kind(),
            rules: strategy.config().rules.clone(),
            created_at: Utc::now(),
        };

        state
            .ledger
            .reserve(assignment.clone())
            .map_err(AssignmentError::AssignmentFailed)?;

        if let Err(err) = self.registry.insert(&assignment) {
            // The ledger entry was inserted just above, so the release cannot miss.
            let _ = state.ledger.release(&assignment.room_id, &assignment.exam_id);
            warn!(
                exam_id = %assignment.exam_id,
                room_id = %assignment.room_id,
                error = %err,
                "registry write failed; reservation rolled back"
            );
            return Err(err.into());
        }

        let remaining_students = remaining - placement.assign_count;
        if let Some(counter) = state.enrollment.get_mut(&exam.id) {
            counter.remaining = remaining_students;
        }

        info!(
            exam_id = %assignment.exam_id,
            room_id = %assignment.room_id,
            count = assignment.count,
            remaining = remaining_students,
            strategy = strategy.kind().as_str(),
            assignment_type = placement.assignment_type.label(),
            "assignment committed"
        );

        Ok(AssignOutcome {
            assignment_type: placement.assignment_type,
            students_assigned: placement.assign_count,
            remaining_students,
        })
    }

    /// The pending assignment if it matches `token` and has not expired. Expired entries are
    /// dropped from the slot.
    fn current_pending(
        &self,
        state: &mut AssignmentState,
        token: &PendingToken,
    ) -> Result<PendingAssignment, AssignmentError> {
        let pending = match &state.pending {
            Some(pending) if &pending.token == token => pending.clone(),
            _ => return Err(AssignmentError::PendingNotFound(token.clone())),
        };

        if self.is_expired(&pending, Utc::now()) {
            state.pending = None;
            info!(token = %token, "pending assignment expired");
            return Err(AssignmentError::PendingExpired(token.clone()));
        }
        Ok(pending)
    }

    fn is_expired(&self, pending: &PendingAssignment, now: DateTime<Utc>) -> bool {
        self.pending_ttl
            .map(|ttl| now - pending.staged_at >= ttl)
            .unwrap_or(false)
    }

    fn resolve_algorithm(
        &self,
        algorithm_id: &AlgorithmId,
    ) -> Result<ResolvedStrategy, AssignmentError> {
        let config = self
            .catalog
            .get_algorithm(algorithm_id)?
            .ok_or_else(|| AssignmentError::UnknownAlgorithm(algorithm_id.to_string()))?;
        ResolvedStrategy::resolve(config).map_err(|err| match err {
            StrategyError::UnknownAlgorithm(kind) => AssignmentError::UnknownAlgorithm(format!(
                "{algorithm_id} (type '{kind}')"
            )),
            other => AssignmentError::UnknownAlgorithm(other.to_string()),
        })
    }

    fn load_exam(&self, exam_id: &ExamId) -> Result<Exam, AssignmentError> {
        self.catalog
            .exam(exam_id)?
            .ok_or_else(|| AssignmentError::ExamNotFound(exam_id.clone()))
    }

    fn load_room(&self, room_id: &RoomId) -> Result<Room, AssignmentError> {
        let room = self
            .catalog
            .room(room_id)?
            .ok_or_else(|| AssignmentError::RoomNotFound(room_id.clone()))?;
        if !room.is_active() {
            return Err(AssignmentError::RoomInactive(room.id));
        }
        Ok(room)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, AssignmentState>, AssignmentError> {
        self.state
            .lock()
            .map_err(|_| AssignmentError::StateUnavailable)
    }
}

/// Wire-level classification of [`AssignmentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    RoomOccupied,
    CapacityExceeded,
    UnknownAlgorithm,
    NotFound,
    ConcurrentModification,
    PendingConflict,
    PendingExpired,
    InvalidRequest,
    Unavailable,
}

/// Error raised by the assignment orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("room {room_id} is already assigned to exam {exam_id}")]
    RoomOccupied { room_id: RoomId, exam_id: ExamId },
    #[error("room {room_id} seats {capacity}, cannot place {requested}")]
    CapacityExceeded {
        room_id: RoomId,
        requested: u32,
        capacity: u32,
    },
    #[error("assignment failed: {0}")]
    AssignmentFailed(#[source] LedgerError),
    #[error("unknown allocation algorithm {0}")]
    UnknownAlgorithm(String),
    #[error("exam {0} not found")]
    ExamNotFound(ExamId),
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("room {0} is inactive")]
    RoomInactive(RoomId),
    #[error("no assignment of exam {exam_id} in room {room_id}")]
    AssignmentNotFound { room_id: RoomId, exam_id: ExamId },
    #[error("exam {0} has no remaining candidates")]
    NothingToAssign(ExamId),
    #[error("invalid proposed count {proposed}: {reason}")]
    InvalidCount { proposed: u32, reason: String },
    #[error("state changed since staging: {0}")]
    ConcurrentModification(String),
    #[error("assignment {0} is already staged; confirm or cancel it first")]
    PendingConflict(PendingToken),
    #[error("pending assignment {0} not found")]
    PendingNotFound(PendingToken),
    #[error("pending assignment {0} expired")]
    PendingExpired(PendingToken),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("assignment state unavailable")]
    StateUnavailable,
}

impl AssignmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssignmentError::RoomOccupied { .. } => ErrorKind::RoomOccupied,
            AssignmentError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            AssignmentError::AssignmentFailed(reason) => match reason {
                LedgerError::RoomOccupied { .. } => ErrorKind::RoomOccupied,
                LedgerError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
                LedgerError::EmptyAssignment(_) => ErrorKind::InvalidRequest,
                LedgerError::UnknownRoom(_) | LedgerError::NotFound { .. } => ErrorKind::NotFound,
            },
            AssignmentError::UnknownAlgorithm(_) => ErrorKind::UnknownAlgorithm,
            AssignmentError::ExamNotFound(_)
            | AssignmentError::RoomNotFound(_)
            | AssignmentError::AssignmentNotFound { .. }
            | AssignmentError::PendingNotFound(_) => ErrorKind::NotFound,
            AssignmentError::RoomInactive(_)
            | AssignmentError::NothingToAssign(_)
            | AssignmentError::InvalidCount { .. } => ErrorKind::InvalidRequest,
            AssignmentError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            AssignmentError::PendingConflict(_) => ErrorKind::PendingConflict,
            AssignmentError::PendingExpired(_) => ErrorKind::PendingExpired,
            AssignmentError::Registry(RegistryError::NotFound { .. }) => ErrorKind::NotFound,
            AssignmentError::Registry(RegistryError::Conflict(_)) => {
                ErrorKind::ConcurrentModification
            }
            AssignmentError::Registry(RegistryError::Unavailable(_))
            | AssignmentError::Directory(_)
            | AssignmentError::StateUnavailable => ErrorKind::Unavailable,
        }
    }
}
