//! Exam seating assignment engine.
//!
//! Candidates of an exam are placed into rooms one drop at a time. A drop is either staged and
//! later confirmed or cancelled, or assigned in a single call. The capacity ledger enforces one
//! exam per room and never lets committed seats exceed a room's capacity; the orchestrator keeps
//! `remaining + committed == total` for every exam.

pub mod directory;
pub mod domain;
pub mod ledger;
pub mod registry;
pub mod router;
pub mod service;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use directory::{
    AlgorithmDirectory, Catalog, DirectoryError, ExamDirectory, RoomDirectory, StaticCatalog,
};
pub use domain::{
    AlgorithmId, AssignOutcome, Assignment, AssignmentType, Candidate, Exam, ExamId,
    PendingAssignment, PendingToken, PlacementGroup, Room, RoomFilter, RoomId, RoomOccupancyView,
    RoomStatus, RoomSuggestion, StudentId,
};
pub use ledger::{LedgerError, RoomCapacityLedger};
pub use registry::{
    AssignmentRegistry, FileAssignmentRegistry, InMemoryAssignmentRegistry, RegistryError,
};
pub use router::assignment_router;
pub use service::{AssignmentError, AssignmentService, ErrorKind};
pub use strategy::{
    AlgorithmConfig, AllocationStrategy, Capabilities, Placement, ResolvedStrategy,
    StrategyError, StrategyKind,
};
