use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        common::ApiResponse,
        leaderboard::LeaderboardFilterQuery,
        player::{
            CreatePlayerRequest, GameResultRequest, PlayerResponse, PlayerStatsResponse,
            RankResponse, ScoreUpdateRequest, UpdatePlayerRequest,
        },
    },
    error::AppError,
    services::{player_service, rank_service},
    state::SharedState,
};

/// Routes handling player profiles, scores, and ranks.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players", post(create_player))
        .route("/players/{id}", get(get_player).put(update_player))
        .route("/players/{id}/score", post(update_score))
        .route("/players/{id}/rank", get(get_rank))
        .route("/players/{id}/results", post(record_game_result))
        .route("/players/{id}/stats", get(get_stats))
}

#[utoipa::path(
    post,
    path = "/players",
    tag = "players",
    request_body = CreatePlayerRequest,
    responses(
        (status = 200, description = "Player created", body = PlayerResponse),
        (status = 409, description = "Display name already taken")
    )
)]
/// Register a new player.
pub async fn create_player(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreatePlayerRequest>>,
) -> Result<Json<ApiResponse<PlayerResponse>>, AppError> {
    let player = player_service::create_player(&state, payload).await?;
    Ok(Json(ApiResponse::new(player)))
}

#[utoipa::path(
    get,
    path = "/players/{id}",
    tag = "players",
    params(("id" = Uuid, Path, description = "Player identifier")),
    responses((status = 200, description = "Player found", body = PlayerResponse))
)]
/// Fetch one player by id.
pub async fn get_player(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PlayerResponse>>, AppError> {
    let player = player_service::get_player(&state, id).await?;
    Ok(Json(ApiResponse::new(player)))
}

#[utoipa::path(
    put,
    path = "/players/{id}",
    tag = "players",
    params(("id" = Uuid, Path, description = "Player identifier")),
    request_body = UpdatePlayerRequest,
    responses((status = 200, description = "Player updated", body = PlayerResponse))
)]
/// Apply a partial profile update.
pub async fn update_player(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdatePlayerRequest>>,
) -> Result<Json<ApiResponse<PlayerResponse>>, AppError> {
    let player = player_service::update_player(&state, id, payload).await?;
    Ok(Json(ApiResponse::new(player)))
}

#[utoipa::path(
    post,
    path = "/players/{id}/score",
    tag = "players",
    params(("id" = Uuid, Path, description = "Player identifier")),
    request_body = ScoreUpdateRequest,
    responses((status = 200, description = "Score written", body = PlayerResponse))
)]
/// Write a new current score for a player.
pub async fn update_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ScoreUpdateRequest>>,
) -> Result<Json<ApiResponse<PlayerResponse>>, AppError> {
    let player = player_service::write_score(&state, id, payload).await?;
    Ok(Json(ApiResponse::new(player.into())))
}

#[utoipa::path(
    get,
    path = "/players/{id}/rank",
    tag = "players",
    params(
        ("id" = Uuid, Path, description = "Player identifier"),
        LeaderboardFilterQuery
    ),
    responses((status = 200, description = "Rank under the filter", body = RankResponse))
)]
/// Look up a player's rank under an optional filter.
pub async fn get_rank(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LeaderboardFilterQuery>,
) -> Result<Json<ApiResponse<RankResponse>>, AppError> {
    let rank = rank_service::rank_of(&state, id, query).await?;
    Ok(Json(ApiResponse::new(rank)))
}

#[utoipa::path(
    post,
    path = "/players/{id}/results",
    tag = "players",
    params(("id" = Uuid, Path, description = "Player identifier")),
    request_body = GameResultRequest,
    responses((status = 200, description = "Game result appended", body = PlayerResponse))
)]
/// Append a finished game to a player's record.
pub async fn record_game_result(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<GameResultRequest>>,
) -> Result<Json<ApiResponse<PlayerResponse>>, AppError> {
    let player = player_service::record_game_result(&state, id, payload).await?;
    Ok(Json(ApiResponse::new(player)))
}

#[utoipa::path(
    get,
    path = "/players/{id}/stats",
    tag = "players",
    params(("id" = Uuid, Path, description = "Player identifier")),
    responses((status = 200, description = "Derived statistics", body = PlayerStatsResponse))
)]
/// Fetch derived statistics for one player.
pub async fn get_stats(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PlayerStatsResponse>>, AppError> {
    let stats = player_service::get_stats(&state, id).await?;
    Ok(Json(ApiResponse::new(stats)))
}
