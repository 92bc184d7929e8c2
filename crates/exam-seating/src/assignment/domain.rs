use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::StrategyKind;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a scheduled exam.
    ExamId
);
string_id!(
    /// Identifier of a physical room.
    RoomId
);
string_id!(
    /// Identifier of an algorithm configuration held by the algorithm directory.
    AlgorithmId
);
string_id!(StudentId);
string_id!(
    /// Opaque handle returned by `stage` and presented again on confirm/cancel.
    PendingToken
);

/// A candidate on an exam roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub student_id: StudentId,
    pub surname: String,
    pub given_name: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl Candidate {
    pub fn new(student_id: &str, surname: &str, given_name: &str) -> Self {
        Self {
            student_id: StudentId::from(student_id),
            surname: surname.to_string(),
            given_name: given_name.to_string(),
            department: None,
        }
    }

    pub fn in_department(mut self, department: &str) -> Self {
        self.department = Some(department.to_string());
        self
    }
}

/// One scheduled test for one course.
///
/// `remaining_enrollment` as published by the exam directory is only a hint; the
/// orchestrator owns the live counter and overlays it on every read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub course_code: String,
    pub course_name: String,
    pub total_enrollment: u32,
    pub remaining_enrollment: u32,
    /// Ordered roster; empty for exams tracked by headcount only.
    #[serde(default)]
    pub roster: Vec<Candidate>,
}

impl Exam {
    pub fn new(id: &str, course_code: &str, course_name: &str, total_enrollment: u32) -> Self {
        Self {
            id: ExamId::from(id),
            course_code: course_code.to_string(),
            course_name: course_name.to_string(),
            total_enrollment,
            remaining_enrollment: total_enrollment,
            roster: Vec::new(),
        }
    }

    pub fn with_roster(mut self, roster: Vec<Candidate>) -> Self {
        self.roster = roster;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Inactive,
}

/// A fixed-capacity seating location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_number: String,
    pub capacity: u32,
    pub status: RoomStatus,
    #[serde(default)]
    pub building: Option<String>,
}

impl Room {
    pub fn new(id: &str, room_number: &str, capacity: u32) -> Self {
        Self {
            id: RoomId::from(id),
            room_number: room_number.to_string(),
            capacity,
            status: RoomStatus::Active,
            building: None,
        }
    }

    pub fn in_building(mut self, building: &str) -> Self {
        self.building = Some(building.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.status = RoomStatus::Inactive;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    /// Sort key for "lowest room number": numeric numbers first in numeric order, then the rest
    /// lexicographically.
    pub fn number_key(&self) -> (u8, u64, &str) {
        match self.room_number.trim().parse::<u64>() {
            Ok(number) => (0, number, self.room_number.as_str()),
            Err(_) => (1, 0, self.room_number.as_str()),
        }
    }
}

/// Filter accepted by the room directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFilter {
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub min_capacity: Option<u32>,
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        let building_matches = match (&self.building, &room.building) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        let capacity_matches = self
            .min_capacity
            .map(|minimum| room.capacity >= minimum)
            .unwrap_or(true);

        room.is_active() && building_matches && capacity_matches
    }
}

/// Whether one room absorbed all or only some of an exam's remaining candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Full,
    Partial,
}

impl AssignmentType {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentType::Full => "full",
            AssignmentType::Partial => "partial",
        }
    }
}

/// Labelled slice of the candidates placed in one room, e.g. a surname range or a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementGroup {
    pub label: String,
    pub count: u32,
}

/// A committed allocation of `count` candidates of one exam to one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub exam_id: ExamId,
    pub room_id: RoomId,
    pub count: u32,
    #[serde(default)]
    pub students: Vec<StudentId>,
    #[serde(default)]
    pub groups: Vec<PlacementGroup>,
    pub algorithm_id: AlgorithmId,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub rules: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Staged, uncommitted proposal awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAssignment {
    pub token: PendingToken,
    pub exam_id: ExamId,
    pub room_id: RoomId,
    pub proposed_count: u32,
    pub staged_at: DateTime<Utc>,
}

/// Response of a successful assign/confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignOutcome {
    pub assignment_type: AssignmentType,
    pub students_assigned: u32,
    pub remaining_students: u32,
}

/// Read model pairing a room with its committed occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomOccupancyView {
    pub room: Room,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupied_by: Option<ExamId>,
    pub committed: u32,
    pub remaining_capacity: u32,
}

/// Candidate room ranked for an exam by the selected strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSuggestion {
    pub room_id: RoomId,
    pub room_number: String,
    pub capacity: u32,
    pub would_assign: u32,
    pub wasted_seats: u32,
    pub assignment_type: AssignmentType,
}
