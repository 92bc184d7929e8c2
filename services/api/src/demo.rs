use crate::infra::demo_catalog;
use clap::Args;
use exam_seating::assignment::{
    AlgorithmId, AssignOutcome, AssignmentError, AssignmentService, ExamId,
    InMemoryAssignmentRegistry, RoomId, StaticCatalog,
};
use exam_seating::config::SeatingConfig;
use exam_seating::error::AppError;
use std::sync::Arc;

type DemoService = AssignmentService<StaticCatalog, InMemoryAssignmentRegistry>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the committed assignments as JSON before they are cleared.
    #[arg(long)]
    pub(crate) show_assignments: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = AssignmentService::new(
        Arc::new(demo_catalog()),
        Arc::new(InMemoryAssignmentRegistry::new()),
        &SeatingConfig::default(),
    )?;

    println!("Exam seating demo");
    print_assignable(&service);

    println!("\nSingle-call assignments");
    assign_step(&service, "exam-cs101", "room-101", "alg-round-robin");
    assign_step(&service, "exam-ma201", "room-102", "alg-round-robin");
    assign_step(&service, "exam-ma201", "room-101", "alg-round-robin");
    print_assignable(&service);

    println!("\nRemoval");
    match service.remove_assignment(&RoomId::from("room-101"), &ExamId::from("exam-cs101")) {
        Ok(removed) => println!(
            "  Removed exam-cs101 from room-101: {} seats returned",
            removed.count
        ),
        Err(err) => println!("  Removal rejected: {err}"),
    }
    assign_step(&service, "exam-cs101", "room-101", "alg-genetic");

    println!("\nStaged assignment");
    stage_best_fit(&service, "exam-ma201");

    println!("\nAlphabetical seating");
    assign_step(&service, "exam-hi110", "room-205", "alg-alpha");
    assign_step(&service, "exam-hi110", "room-201", "alg-alpha");
    match service.assignments() {
        Ok(assignments) => {
            for assignment in assignments
                .iter()
                .filter(|assignment| assignment.exam_id.0 == "exam-hi110")
            {
                let ranges: Vec<String> = assignment
                    .groups
                    .iter()
                    .map(|group| format!("{} ({})", group.label, group.count))
                    .collect();
                println!("  {}: {}", assignment.room_id, ranges.join(", "));
            }
            if args.show_assignments {
                match serde_json::to_string_pretty(&assignments) {
                    Ok(json) => println!("\nCommitted assignments:\n{json}"),
                    Err(err) => println!("\nCommitted assignments unavailable: {err}"),
                }
            }
        }
        Err(err) => println!("  Assignments unavailable: {err}"),
    }

    println!("\nReset");
    match service.clear_all() {
        Ok(removed) => println!("  Cleared {removed} assignments"),
        Err(err) => println!("  Clear rejected: {err}"),
    }
    print_assignable(&service);

    Ok(())
}

fn assign_step(service: &DemoService, exam: &str, room: &str, algorithm: &str) {
    let result = service.assign(
        &ExamId::from(exam),
        &RoomId::from(room),
        &AlgorithmId::from(algorithm),
    );
    println!("  {exam} -> {room} [{algorithm}]: {}", describe(result));
}

fn stage_best_fit(service: &DemoService, exam: &str) {
    let exam_id = ExamId::from(exam);
    let best_fit = AlgorithmId::from("alg-best-fit");

    let suggestion = match service.suggest_rooms(&exam_id, &best_fit) {
        Ok(suggestions) => suggestions.into_iter().next(),
        Err(err) => {
            println!("  Suggestions unavailable: {err}");
            return;
        }
    };
    let Some(suggestion) = suggestion else {
        println!("  No free room for {exam}");
        return;
    };
    println!(
        "  Best fit for {exam}: room {} ({} seats, {} wasted)",
        suggestion.room_number, suggestion.capacity, suggestion.wasted_seats
    );

    let pending = match service.stage(&exam_id, &suggestion.room_id, None) {
        Ok(pending) => pending,
        Err(err) => {
            println!("  Stage rejected: {err}");
            return;
        }
    };
    println!(
        "  Staged {} candidates as {}",
        pending.proposed_count, pending.token
    );
    println!(
        "  Confirmed: {}",
        describe(service.confirm(&pending.token, &best_fit))
    );
}

fn print_assignable(service: &DemoService) {
    match service.assignable_exams() {
        Ok(exams) if exams.is_empty() => println!("Assignable exams: none"),
        Ok(exams) => {
            println!("Assignable exams:");
            for exam in exams {
                println!(
                    "  {} {}: {} of {} unseated",
                    exam.course_code,
                    exam.course_name,
                    exam.remaining_enrollment,
                    exam.total_enrollment
                );
            }
        }
        Err(err) => println!("Assignable exams unavailable: {err}"),
    }
}

fn describe(result: Result<AssignOutcome, AssignmentError>) -> String {
    match result {
        Ok(outcome) => format!(
            "{} drop of {}, {} still unseated",
            outcome.assignment_type.label(),
            outcome.students_assigned,
            outcome.remaining_students
        ),
        Err(err) => format!("{:?}: {err}", err.kind()),
    }
}
