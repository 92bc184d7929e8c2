use super::common::*;
use crate::assignment::domain::{AlgorithmId, AssignmentType, RoomFilter, StudentId};
use crate::assignment::registry::{AssignmentRegistry, InMemoryAssignmentRegistry};
use crate::assignment::service::{AssignmentError, AssignmentService, ErrorKind};
use std::sync::Arc;

fn alg(id: &str) -> AlgorithmId {
    AlgorithmId::from(id)
}

fn remaining_of(service: &MemoryService, id: &str) -> u32 {
    service
        .exam(&exam(id))
        .expect("exam lookup")
        .remaining_enrollment
}

#[test]
fn full_assignment_removes_exam_from_assignable_list() {
    let (service, registry) = build_service();

    let outcome = service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("assign succeeds");

    assert_eq!(outcome.assignment_type, AssignmentType::Full);
    assert_eq!(outcome.students_assigned, 50);
    assert_eq!(outcome.remaining_students, 0);

    let assignable = service.assignable_exams().expect("assignable exams");
    assert!(assignable.iter().all(|exam| exam.id.0 != SMALL_EXAM));
    assert_eq!(registry.list().expect("registry list").len(), 1);
}

#[test]
fn partial_assignment_keeps_exam_assignable() {
    let (service, _) = build_service();

    let outcome = service
        .assign(&exam(LARGE_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("assign succeeds");

    assert_eq!(outcome.assignment_type, AssignmentType::Partial);
    assert_eq!(outcome.students_assigned, 80);
    assert_eq!(outcome.remaining_students, 40);

    let large = service
        .assignable_exams()
        .expect("assignable exams")
        .into_iter()
        .find(|exam| exam.id.0 == LARGE_EXAM)
        .expect("large exam still assignable");
    assert_eq!(large.remaining_enrollment, 40);
}

#[test]
fn assign_to_occupied_room_is_rejected_without_state_change() {
    let (service, _) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("first assign");
    let before = service.assignments().expect("assignments");

    let err = service
        .assign(&exam(LARGE_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect_err("room is occupied");

    assert!(matches!(err, AssignmentError::RoomOccupied { .. }));
    assert_eq!(err.kind(), ErrorKind::RoomOccupied);
    assert_eq!(service.assignments().expect("assignments"), before);
    assert_eq!(remaining_of(&service, LARGE_EXAM), 120);
}

#[test]
fn remove_assignment_restores_enrollment_and_frees_room() {
    let (service, registry) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("assign");

    let removed = service
        .remove_assignment(&room("r-101"), &exam(SMALL_EXAM))
        .expect("remove succeeds");

    assert_eq!(removed.count, 50);
    assert_eq!(remaining_of(&service, SMALL_EXAM), 50);
    assert!(registry.list().expect("list").is_empty());

    let rooms = service.rooms(&RoomFilter::default()).expect("rooms");
    let freed = rooms
        .iter()
        .find(|view| view.room.id == room("r-101"))
        .expect("room listed");
    assert_eq!(freed.occupied_by, None);
    assert_eq!(freed.remaining_capacity, 80);
}

#[test]
fn unknown_algorithm_leaves_room_unoccupied() {
    let (service, _) = build_service();

    for id in ["alg-missing", "alg-bogus"] {
        let err = service
            .assign(&exam(SMALL_EXAM), &room("r-101"), &alg(id))
            .expect_err("algorithm is rejected");
        assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm, "{id}");
    }

    assert!(service.assignments().expect("assignments").is_empty());
    assert_eq!(remaining_of(&service, SMALL_EXAM), 50);
}

#[test]
fn remove_of_unknown_pair_reports_not_found() {
    let (service, _) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("assign");

    let err = service
        .remove_assignment(&room("r-101"), &exam(LARGE_EXAM))
        .expect_err("wrong exam");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(service.assignments().expect("assignments").len(), 1);
}

#[test]
fn clear_all_resets_every_exam_and_is_idempotent() {
    let (service, registry) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("small");
    service
        .assign(&exam(LARGE_EXAM), &room("r-102"), &alg("alg-rr"))
        .expect("large");

    assert_eq!(service.clear_all().expect("clear"), 2);
    assert_eq!(service.clear_all().expect("clear again"), 0);

    assert!(registry.list().expect("list").is_empty());
    assert_eq!(remaining_of(&service, SMALL_EXAM), 50);
    assert_eq!(remaining_of(&service, LARGE_EXAM), 120);
}

#[test]
fn stage_then_confirm_commits_and_clears_pending() {
    let (service, _) = build_service();

    let pending = service
        .stage(&exam(LARGE_EXAM), &room("r-201"), None)
        .expect("stage");
    assert_eq!(pending.proposed_count, 40);
    assert!(service.assignments().expect("assignments").is_empty());

    let outcome = service
        .confirm(&pending.token, &alg("alg-rr"))
        .expect("confirm");
    assert_eq!(outcome.students_assigned, 40);
    assert_eq!(outcome.remaining_students, 80);
    assert_eq!(service.pending().expect("pending"), None);
}

#[test]
fn second_stage_conflicts_until_first_is_cancelled() {
    let (service, _) = build_service();
    let first = service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("first stage");

    let err = service
        .stage(&exam(LARGE_EXAM), &room("r-102"), None)
        .expect_err("slot taken");
    assert_eq!(err.kind(), ErrorKind::PendingConflict);

    let cancelled = service.cancel(&first.token).expect("cancel");
    assert_eq!(cancelled.token, first.token);
    assert!(service.assignments().expect("assignments").is_empty());

    service
        .stage(&exam(LARGE_EXAM), &room("r-102"), None)
        .expect("slot free again");
}

#[test]
fn stage_validates_room_and_proposed_count() {
    let (service, _) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("occupy r-101");

    let cases = [
        (LARGE_EXAM, "r-101", None, ErrorKind::RoomOccupied),
        (LARGE_EXAM, "r-closed", None, ErrorKind::InvalidRequest),
        (LARGE_EXAM, "r-nowhere", None, ErrorKind::NotFound),
        (SMALL_EXAM, "r-102", None, ErrorKind::InvalidRequest),
        (LARGE_EXAM, "r-102", Some(0), ErrorKind::InvalidRequest),
        (LARGE_EXAM, "r-102", Some(90), ErrorKind::CapacityExceeded),
        (ROSTER_EXAM, "r-102", Some(7), ErrorKind::InvalidRequest),
    ];

    for (exam_id, room_id, proposed, expected) in cases {
        let err = service
            .stage(&exam(exam_id), &room(room_id), proposed)
            .expect_err("stage rejected");
        assert_eq!(err.kind(), expected, "{exam_id} -> {room_id} ({proposed:?})");
    }
    assert_eq!(service.pending().expect("pending"), None);
}

#[test]
fn confirm_after_room_taken_reports_concurrent_modification() {
    let (service, _) = build_service();
    let pending = service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("stage");

    service
        .assign(&exam(LARGE_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("single-call assign bypasses the pending slot");

    let err = service
        .confirm(&pending.token, &alg("alg-rr"))
        .expect_err("room no longer free");
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);

    assert_eq!(service.pending().expect("pending"), Some(pending.clone()));
    assert_eq!(remaining_of(&service, SMALL_EXAM), 50);
    service.cancel(&pending.token).expect("cancel kept pending");
}

#[test]
fn confirm_after_exam_exhausted_reports_concurrent_modification() {
    let (service, _) = build_service();
    let pending = service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("stage");
    service
        .assign(&exam(SMALL_EXAM), &room("r-102"), &alg("alg-rr"))
        .expect("exam fully seated elsewhere");

    let err = service
        .confirm(&pending.token, &alg("alg-rr"))
        .expect_err("nothing left to seat");
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    assert_eq!(service.assignments().expect("assignments").len(), 1);
}

#[test]
fn confirm_with_unknown_algorithm_keeps_pending() {
    let (service, _) = build_service();
    let pending = service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("stage");

    let err = service
        .confirm(&pending.token, &alg("alg-bogus"))
        .expect_err("unknown type");
    assert_eq!(err.kind(), ErrorKind::UnknownAlgorithm);
    assert_eq!(service.pending().expect("pending"), Some(pending.clone()));

    service
        .confirm(&pending.token, &alg("alg-rr"))
        .expect("retry with a known algorithm");
}

#[test]
fn confirm_with_stale_token_is_not_found() {
    let (service, _) = build_service();
    service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("stage");

    let err = service
        .confirm(&"pending-unknown".into(), &alg("alg-rr"))
        .expect_err("token mismatch");
    assert!(matches!(err, AssignmentError::PendingNotFound(_)));
}

#[test]
fn expired_pending_is_rejected_and_frees_the_slot() {
    let (service, _) = build_service_with(expiring_config());
    let pending = service
        .stage(&exam(SMALL_EXAM), &room("r-101"), None)
        .expect("stage");

    assert_eq!(service.pending().expect("pending"), None);
    let err = service
        .confirm(&pending.token, &alg("alg-rr"))
        .expect_err("expired");
    assert_eq!(err.kind(), ErrorKind::PendingExpired);
    assert!(service.assignments().expect("assignments").is_empty());

    service
        .stage(&exam(LARGE_EXAM), &room("r-102"), None)
        .expect("expired slot is reusable");
}

#[test]
fn registry_failure_rolls_back_reservation() {
    let service = unavailable_service();

    let err = service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect_err("registry refuses writes");
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    assert!(service.assignments().expect("assignments").is_empty());
    assert_eq!(
        service
            .exam(&exam(SMALL_EXAM))
            .expect("exam")
            .remaining_enrollment,
        50
    );
}

#[test]
fn alphabetical_grouping_gives_first_room_the_earliest_slice() {
    let (service, _) = build_service();

    let first = service
        .assign(&exam(ROSTER_EXAM), &room("r-050"), &alg("alg-alpha"))
        .expect("first room");
    assert_eq!(first.assignment_type, AssignmentType::Partial);
    assert_eq!(first.remaining_students, 2);

    let second = service
        .assign(&exam(ROSTER_EXAM), &room("r-201"), &alg("alg-alpha"))
        .expect("second room");
    assert_eq!(second.assignment_type, AssignmentType::Full);

    let assignments = service.assignments().expect("assignments");
    let small_room = assignments
        .iter()
        .find(|assignment| assignment.room_id == room("r-050"))
        .expect("r-050 assigned");
    let ids: Vec<&str> = small_room.students.iter().map(|id| id.0.as_str()).collect();
    assert_eq!(ids, vec!["s-2", "s-4", "s-5", "s-6"]);
    assert_eq!(small_room.groups[0].label, "Adams - Diaz");
    assert_eq!(small_room.rules, vec!["sort_by_surname".to_string()]);

    let rest = assignments
        .iter()
        .find(|assignment| assignment.room_id == room("r-201"))
        .expect("r-201 assigned");
    assert_eq!(
        rest.students,
        vec![StudentId::from("s-3"), StudentId::from("s-1")]
    );
    assert_eq!(rest.groups[0].label, "Okafor - Zhang");
}

#[test]
fn room_listing_applies_filter_and_reports_occupancy() {
    let (service, _) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-102"), &alg("alg-rr"))
        .expect("assign");

    let rooms = service
        .rooms(&RoomFilter {
            building: Some("science".to_string()),
            min_capacity: Some(50),
        })
        .expect("rooms");

    let numbers: Vec<&str> = rooms
        .iter()
        .map(|view| view.room.room_number.as_str())
        .collect();
    assert_eq!(numbers, vec!["101", "102"]);
    assert_eq!(rooms[1].occupied_by, Some(exam(SMALL_EXAM)));
    assert_eq!(rooms[1].committed, 50);
    assert_eq!(rooms[1].remaining_capacity, 30);
}

#[test]
fn suggestions_skip_occupied_rooms() {
    let (service, _) = build_service();
    service
        .assign(&exam(SMALL_EXAM), &room("r-annex"), &alg("alg-rr"))
        .expect("occupy annex");

    let suggestions = service
        .suggest_rooms(&exam(LARGE_EXAM), &alg("alg-cap"))
        .expect("suggestions");

    assert!(suggestions
        .iter()
        .all(|suggestion| suggestion.room_id != room("r-annex")));
    assert_eq!(suggestions[0].room_id, room("r-101"));
    assert_eq!(suggestions[0].would_assign, 80);
    assert_eq!(suggestions[0].assignment_type, AssignmentType::Partial);
}

#[test]
fn hydrated_rooms_report_remaining_seats_from_the_ledger() {
    let registry = Arc::new(InMemoryAssignmentRegistry::new());
    registry
        .insert(&persisted_assignment(SMALL_EXAM, "r-101", 50))
        .expect("seed registry");
    let service = AssignmentService::new(Arc::new(catalog()), registry, &seating_config())
        .expect("hydrates");

    let rooms = service.rooms(&RoomFilter::default()).expect("rooms");
    let hydrated = rooms
        .iter()
        .find(|view| view.room.id == room("r-101"))
        .expect("room listed");
    assert_eq!(hydrated.occupied_by, Some(exam(SMALL_EXAM)));
    assert_eq!(hydrated.committed, 50);
    assert_eq!(hydrated.remaining_capacity, 30);
    assert_eq!(
        service
            .exam(&exam(SMALL_EXAM))
            .expect("exam")
            .remaining_enrollment,
        0
    );
}

#[test]
fn revised_enrollment_total_is_honoured_by_remove_and_clear() {
    let catalog = Arc::new(RevisableCatalog::new(catalog()));
    let service = AssignmentService::new(
        catalog.clone(),
        Arc::new(InMemoryAssignmentRegistry::new()),
        &seating_config(),
    )
    .expect("service builds");
    let remaining = |service: &AssignmentService<RevisableCatalog, InMemoryAssignmentRegistry>| {
        service
            .exam(&exam(SMALL_EXAM))
            .expect("exam")
            .remaining_enrollment
    };

    service
        .assign(&exam(SMALL_EXAM), &room("r-101"), &alg("alg-rr"))
        .expect("assign");
    assert_eq!(remaining(&service), 0);

    catalog.set_total(SMALL_EXAM, 70);
    assert_eq!(remaining(&service), 20);

    service
        .remove_assignment(&room("r-101"), &exam(SMALL_EXAM))
        .expect("remove");
    assert_eq!(remaining(&service), 70);

    service
        .assign(&exam(SMALL_EXAM), &room("r-102"), &alg("alg-rr"))
        .expect("assign again");
    assert_eq!(service.clear_all().expect("clear"), 1);
    assert_eq!(remaining(&service), 70);
}
