use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::directory::Catalog;
use super::domain::{AlgorithmId, ExamId, PendingToken, RoomFilter, RoomId};
use super::registry::AssignmentRegistry;
use super::service::{AssignmentError, AssignmentService, ErrorKind};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub exam_id: ExamId,
    pub room_id: RoomId,
    pub algorithm_id: AlgorithmId,
}

#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub exam_id: ExamId,
    pub room_id: RoomId,
    #[serde(default)]
    pub proposed_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub algorithm_id: AlgorithmId,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub algorithm_id: AlgorithmId,
}

/// Router exposing the assignment workflow.
pub fn assignment_router<C, R>(service: Arc<AssignmentService<C, R>>) -> Router
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    Router::new()
        .route(
            "/api/v1/assignments",
            post(assign_handler::<C, R>)
                .get(list_handler::<C, R>)
                .delete(clear_handler::<C, R>),
        )
        .route("/api/v1/assignments/stage", post(stage_handler::<C, R>))
        .route("/api/v1/assignments/pending", get(pending_handler::<C, R>))
        .route(
            "/api/v1/assignments/pending/:token/confirm",
            post(confirm_handler::<C, R>),
        )
        .route(
            "/api/v1/assignments/pending/:token",
            delete(cancel_handler::<C, R>),
        )
        .route(
            "/api/v1/assignments/:room_id/:exam_id",
            delete(remove_handler::<C, R>),
        )
        .route(
            "/api/v1/exams/assignable",
            get(assignable_exams_handler::<C, R>),
        )
        .route(
            "/api/v1/exams/:exam_id/room-suggestions",
            get(suggestions_handler::<C, R>),
        )
        .route("/api/v1/rooms", get(rooms_handler::<C, R>))
        .with_state(service)
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RoomOccupied
        | ErrorKind::ConcurrentModification
        | ErrorKind::PendingConflict => StatusCode::CONFLICT,
        ErrorKind::CapacityExceeded | ErrorKind::InvalidRequest => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::UnknownAlgorithm => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PendingExpired => StatusCode::GONE,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn error_response(error: AssignmentError) -> Response {
    let kind = error.kind();
    let payload = json!({
        "kind": kind,
        "message": error.to_string(),
    });
    (status_for(kind), Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, AssignmentError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assign_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Json(request): Json<AssignRequest>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    let result = service.assign(&request.exam_id, &request.room_id, &request.algorithm_id);
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn list_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    respond(StatusCode::OK, service.assignments())
}

pub(crate) async fn clear_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    let result = service
        .clear_all()
        .map(|removed| json!({ "removed_count": removed }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn stage_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Json(request): Json<StageRequest>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    let result = service.stage(&request.exam_id, &request.room_id, request.proposed_count);
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn pending_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    match service.pending() {
        Ok(Some(pending)) => (StatusCode::OK, Json(pending)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn confirm_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Path(token): Path<String>,
    Json(request): Json<ConfirmRequest>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    let result = service.confirm(&PendingToken(token), &request.algorithm_id);
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn cancel_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Path(token): Path<String>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    respond(StatusCode::OK, service.cancel(&PendingToken(token)))
}

pub(crate) async fn remove_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Path((room_id, exam_id)): Path<(String, String)>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    match service.remove_assignment(&RoomId(room_id), &ExamId(exam_id)) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assignable_exams_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    respond(StatusCode::OK, service.assignable_exams())
}

pub(crate) async fn suggestions_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Path(exam_id): Path<String>,
    Query(query): Query<SuggestionQuery>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    respond(
        StatusCode::OK,
        service.suggest_rooms(&ExamId(exam_id), &query.algorithm_id),
    )
}

pub(crate) async fn rooms_handler<C, R>(
    State(service): State<Arc<AssignmentService<C, R>>>,
    Query(filter): Query<RoomFilter>,
) -> Response
where
    C: Catalog + 'static,
    R: AssignmentRegistry + 'static,
{
    respond(StatusCode::OK, service.rooms(&filter))
}
