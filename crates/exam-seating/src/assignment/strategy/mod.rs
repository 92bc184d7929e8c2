//! Allocation strategies.
//!
//! Every strategy shares the same capacity arithmetic: a room takes
//! `min(remaining, capacity)` candidates, and the drop is `full` when that absorbs everything
//! still waiting. Strategies differ only in which candidates go first, how the placed slice is
//! labelled, and how candidate rooms are ranked.

mod variants;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::domain::{
    AlgorithmId, AssignmentType, Candidate, PlacementGroup, Room, RoomSuggestion, StudentId,
};

pub use variants::{AlphabeticalGrouping, CapacityOptimization, DepartmentGrouping, RoundRobin};

/// Named algorithm descriptor owned by the algorithm directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub id: AlgorithmId,
    pub name: String,
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl AlgorithmConfig {
    pub fn new(id: &str, name: &str, algorithm_type: &str) -> Self {
        Self {
            id: AlgorithmId::from(id),
            name: name.to_string(),
            algorithm_type: algorithm_type.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: &[&str]) -> Self {
        self.rules = rules.iter().map(|rule| rule.to_string()).collect();
        self
    }
}

/// Closed set of supported strategy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RoundRobin,
    AlphabeticalGrouping,
    CapacityOptimization,
    DepartmentGrouping,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::RoundRobin,
        StrategyKind::AlphabeticalGrouping,
        StrategyKind::CapacityOptimization,
        StrategyKind::DepartmentGrouping,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::AlphabeticalGrouping => "alphabetical_grouping",
            StrategyKind::CapacityOptimization => "capacity_optimization",
            StrategyKind::DepartmentGrouping => "department_grouping",
        }
    }

    pub fn strategy(self) -> &'static dyn AllocationStrategy {
        match self {
            StrategyKind::RoundRobin => &RoundRobin,
            StrategyKind::AlphabeticalGrouping => &AlphabeticalGrouping,
            StrategyKind::CapacityOptimization => &CapacityOptimization,
            StrategyKind::DepartmentGrouping => &DepartmentGrouping,
        }
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| StrategyError::UnknownAlgorithm(s.to_string()))
    }
}

/// What a strategy contributes beyond the shared capacity arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub orders_candidates: bool,
    pub groups_candidates: bool,
    pub ranks_rooms: bool,
}

/// A pluggable allocation algorithm.
pub trait AllocationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn capabilities(&self) -> Capabilities;

    /// Orders the candidates still waiting for a seat; the first `seats` go into the room.
    fn order_candidates(&self, candidates: Vec<Candidate>, _seats: u32) -> Vec<Candidate> {
        candidates
    }

    /// Labels the slice placed in one room.
    fn group(&self, _placed: &[Candidate]) -> Vec<PlacementGroup> {
        Vec::new()
    }

    /// Ranks unoccupied rooms for an exam with `remaining` candidates, best first.
    fn rank_rooms(&self, _remaining: u32, mut rooms: Vec<Room>) -> Vec<Room> {
        rooms.sort_by(|a, b| a.number_key().cmp(&b.number_key()));
        rooms
    }
}

/// Outcome of planning one exam-to-room drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub assign_count: u32,
    pub assignment_type: AssignmentType,
    pub students: Vec<StudentId>,
    pub groups: Vec<PlacementGroup>,
}

/// Shared capacity arithmetic: `(assign_count, assignment_type)`.
pub fn capacity_split(remaining: u32, capacity: u32) -> Result<(u32, AssignmentType), StrategyError> {
    if remaining == 0 {
        return Err(StrategyError::NothingToAssign);
    }
    if capacity == 0 {
        return Err(StrategyError::ZeroCapacity);
    }

    let assign_count = remaining.min(capacity);
    let assignment_type = if assign_count == remaining {
        AssignmentType::Full
    } else {
        AssignmentType::Partial
    };
    Ok((assign_count, assignment_type))
}

/// An algorithm config bound to its strategy implementation.
#[derive(Clone)]
pub struct ResolvedStrategy {
    config: AlgorithmConfig,
    kind: StrategyKind,
    strategy: &'static dyn AllocationStrategy,
}

impl std::fmt::Debug for ResolvedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStrategy")
            .field("config", &self.config)
            .field("kind", &self.kind)
            .finish()
    }
}

impl ResolvedStrategy {
    /// Binds a config to a strategy. Unknown types are rejected rather than defaulted.
    pub fn resolve(config: AlgorithmConfig) -> Result<Self, StrategyError> {
        let kind: StrategyKind = config.algorithm_type.parse()?;
        Ok(Self {
            config,
            kind,
            strategy: kind.strategy(),
        })
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn config(&self) -> &AlgorithmConfig {
        &self.config
    }

    /// Plans a drop of an exam with `remaining` candidates (of which `unplaced` are the rostered
    /// ones still waiting) into `room`.
    pub fn plan(
        &self,
        remaining: u32,
        unplaced: Vec<Candidate>,
        room: &Room,
    ) -> Result<Placement, StrategyError> {
        let (assign_count, assignment_type) = capacity_split(remaining, room.capacity)?;
        let capabilities = self.strategy.capabilities();

        let ordered = if capabilities.orders_candidates {
            self.strategy.order_candidates(unplaced, assign_count)
        } else {
            unplaced
        };
        let placed: Vec<Candidate> = ordered.into_iter().take(assign_count as usize).collect();

        let groups = if capabilities.groups_candidates {
            self.strategy.group(&placed)
        } else {
            Vec::new()
        };

        Ok(Placement {
            assign_count,
            assignment_type,
            students: placed.into_iter().map(|candidate| candidate.student_id).collect(),
            groups,
        })
    }

    /// Ranks `rooms` for an exam with `remaining` candidates and describes each drop.
    pub fn suggest(&self, remaining: u32, rooms: Vec<Room>) -> Vec<RoomSuggestion> {
        let rooms = rooms.into_iter().filter(|room| room.capacity > 0).collect();
        let ranked = if self.strategy.capabilities().ranks_rooms {
            self.strategy.rank_rooms(remaining, rooms)
        } else {
            AllocationStrategy::rank_rooms(&RoundRobin, remaining, rooms)
        };

        ranked
            .into_iter()
            .filter_map(|room| {
                let (would_assign, assignment_type) =
                    capacity_split(remaining, room.capacity).ok()?;
                Some(RoomSuggestion {
                    wasted_seats: room.capacity - would_assign,
                    room_id: room.id,
                    room_number: room.room_number,
                    capacity: room.capacity,
                    would_assign,
                    assignment_type,
                })
            })
            .collect()
    }
}

/// Strategy resolution and planning failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("unknown allocation algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("exam has no remaining candidates to assign")]
    NothingToAssign,
    #[error("room has no seats")]
    ZeroCapacity,
}
