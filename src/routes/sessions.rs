use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        common::ApiResponse,
        session::{
            CreateSessionRequest, JoinSessionRequest, LeaveSessionRequest, SessionEventView,
            SessionResponse, SessionScoreRequest, SessionStats,
        },
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling the multiplayer session lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_active_sessions))
        .route("/sessions/stats", get(get_session_stats))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/join", post(join_session))
        .route("/sessions/{id}/leave", post(leave_session))
        .route("/sessions/{id}/score", post(update_session_score))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/events", get(get_session_events))
}

#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses((status = 200, description = "Session created", body = SessionResponse))
)]
/// Open a new session in the waiting state.
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::create_session(&state, payload).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    responses((status = 200, description = "Waiting and active sessions", body = [SessionResponse]))
)]
/// List sessions currently waiting for players or being played.
pub async fn list_active_sessions(
    State(state): State<SharedState>,
) -> Result<Json<ApiResponse<Vec<SessionResponse>>>, AppError> {
    let sessions = session_service::list_active(&state).await?;
    Ok(Json(ApiResponse::new(sessions)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Session found", body = SessionResponse))
)]
/// Fetch one session by id.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::get_session(&state, id).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/join",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Player joined (idempotent)", body = SessionResponse),
        (status = 409, description = "Session full or not joinable")
    )
)]
/// Add a player to a session.
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::join_session(&state, id, payload.player_id).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/leave",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LeaveSessionRequest,
    responses((status = 200, description = "Player left", body = SessionResponse))
)]
/// Soft-remove a player from a session.
pub async fn leave_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<LeaveSessionRequest>>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::leave_session(&state, id, payload.player_id).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/score",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SessionScoreRequest,
    responses((status = 200, description = "In-session score written", body = SessionResponse))
)]
/// Overwrite a participant's in-session score.
pub async fn update_session_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SessionScoreRequest>>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::update_session_score(&state, id, payload).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Session completed", body = SessionResponse))
)]
/// Complete an active session and settle final positions.
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionResponse>>, AppError> {
    let session = session_service::end_session(&state, id).await?;
    Ok(Json(ApiResponse::new(session)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Session event log", body = [SessionEventView]))
)]
/// Full event log of one session.
pub async fn get_session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<SessionEventView>>>, AppError> {
    let events = session_service::session_events(&state, id).await?;
    Ok(Json(ApiResponse::new(events)))
}

#[utoipa::path(
    get,
    path = "/sessions/stats",
    tag = "sessions",
    responses((status = 200, description = "Aggregate session statistics", body = SessionStats))
)]
/// Aggregate counts and durations across all sessions.
pub async fn get_session_stats(
    State(state): State<SharedState>,
) -> Result<Json<ApiResponse<SessionStats>>, AppError> {
    let stats = session_service::session_stats(&state).await?;
    Ok(Json(ApiResponse::new(stats)))
}
