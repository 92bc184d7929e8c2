use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{AllocationStrategy, Capabilities, StrategyKind};
use crate::assignment::domain::{Candidate, PlacementGroup, Room};

const UNDECLARED_DEPARTMENT: &str = "Undeclared";

fn by_name(a: &Candidate, b: &Candidate) -> Ordering {
    a.surname
        .to_lowercase()
        .cmp(&b.surname.to_lowercase())
        .then_with(|| a.given_name.to_lowercase().cmp(&b.given_name.to_lowercase()))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Candidates in original roster order; no grouping.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobin;

impl AllocationStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// Candidates sorted by surname so each room holds one contiguous alphabetical range.
///
/// The orchestrator only offers candidates not yet seated, so when an exam spans several rooms
/// the first room confirmed receives the earliest slice.
#[derive(Debug, Clone, Copy)]
pub struct AlphabeticalGrouping;

impl AllocationStrategy for AlphabeticalGrouping {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AlphabeticalGrouping
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            orders_candidates: true,
            groups_candidates: true,
            ranks_rooms: false,
        }
    }

    fn order_candidates(&self, mut candidates: Vec<Candidate>, _seats: u32) -> Vec<Candidate> {
        candidates.sort_by(by_name);
        candidates
    }

    fn group(&self, placed: &[Candidate]) -> Vec<PlacementGroup> {
        let (Some(first), Some(last)) = (placed.first(), placed.last()) else {
            return Vec::new();
        };

        let label = if first.surname == last.surname {
            first.surname.clone()
        } else {
            format!("{} - {}", first.surname, last.surname)
        };

        vec![PlacementGroup {
            label,
            count: placed.len() as u32,
        }]
    }
}

/// Roster order for candidates; ranks rooms by how closely capacity matches remaining
/// enrollment.
#[derive(Debug, Clone, Copy)]
pub struct CapacityOptimization;

impl AllocationStrategy for CapacityOptimization {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CapacityOptimization
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            orders_candidates: false,
            groups_candidates: false,
            ranks_rooms: true,
        }
    }

    /// Rooms that fit everyone come first, least wasted seats first. Rooms that cannot fit
    /// everyone follow, largest first. Ties go to the lowest room number.
    fn rank_rooms(&self, remaining: u32, mut rooms: Vec<Room>) -> Vec<Room> {
        rooms.sort_by(|a, b| {
            fit_key(remaining, a)
                .cmp(&fit_key(remaining, b))
                .then_with(|| a.number_key().cmp(&b.number_key()))
        });
        rooms
    }
}

fn fit_key(remaining: u32, room: &Room) -> (u8, u32) {
    if room.capacity >= remaining {
        (0, room.capacity - remaining)
    } else {
        (1, remaining - room.capacity)
    }
}

/// Candidates partitioned by department, alphabetical within each partition. Candidates without
/// a department always come after every declared department.
///
/// Mixing departments inside one room is avoided when the seat count allows it: a department
/// large enough to fill the room on its own is placed first (the smallest such one), otherwise
/// departments are taken largest first so the room spans as few of them as possible.
#[derive(Debug, Clone, Copy)]
pub struct DepartmentGrouping;

impl AllocationStrategy for DepartmentGrouping {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DepartmentGrouping
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            orders_candidates: true,
            groups_candidates: true,
            ranks_rooms: false,
        }
    }

    fn order_candidates(&self, candidates: Vec<Candidate>, seats: u32) -> Vec<Candidate> {
        let mut declared: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        let mut undeclared = Vec::new();
        for candidate in candidates {
            match &candidate.department {
                Some(department) => declared
                    .entry(department.clone())
                    .or_default()
                    .push(candidate),
                None => undeclared.push(candidate),
            }
        }

        let mut partitions: Vec<Vec<Candidate>> = declared
            .into_values()
            .map(|mut members| {
                members.sort_by(by_name);
                members
            })
            .collect();
        undeclared.sort_by(by_name);

        let seats = seats as usize;
        let lead = partitions
            .iter()
            .enumerate()
            .filter(|(_, members)| members.len() >= seats)
            .min_by_key(|(index, members)| (members.len(), *index))
            .map(|(index, _)| index);

        let mut ordered = Vec::new();
        match lead {
            Some(index) => ordered.extend(partitions.remove(index)),
            // Stable sort keeps name order among equally sized departments.
            None => partitions.sort_by(|a, b| b.len().cmp(&a.len())),
        }
        for members in partitions {
            ordered.extend(members);
        }
        ordered.extend(undeclared);
        ordered
    }

    /// One group per contiguous run of a department. Runs are keyed by the department itself,
    /// so a department literally named like the undeclared label stays separate.
    fn group(&self, placed: &[Candidate]) -> Vec<PlacementGroup> {
        let mut groups: Vec<PlacementGroup> = Vec::new();
        let mut current: Option<Option<&str>> = None;
        for candidate in placed {
            let department = candidate.department.as_deref();
            match groups.last_mut() {
                Some(group) if current == Some(department) => group.count += 1,
                _ => {
                    groups.push(PlacementGroup {
                        label: department.unwrap_or(UNDECLARED_DEPARTMENT).to_string(),
                        count: 1,
                    });
                    current = Some(department);
                }
            }
        }
        groups
    }
}
