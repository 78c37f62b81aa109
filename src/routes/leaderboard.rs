use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        common::ApiResponse,
        leaderboard::{
            AroundQuery, AroundResponse, BreakdownGroup, LeaderboardEntry, LeaderboardFilterQuery,
            LeaderboardPage, LeaderboardPageQuery, LeaderboardStats, RecentQuery,
            RecentlyActiveEntry,
        },
    },
    error::AppError,
    services::rank_service,
    state::SharedState,
};

const DEFAULT_AROUND_RANGE: u32 = 5;
const DEFAULT_RECENT_LIMIT: u64 = 10;

/// Routes serving filtered leaderboard slices and aggregates.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/leaderboard", get(get_page))
        .route("/leaderboard/top/{n}", get(get_top))
        .route("/leaderboard/regions", get(get_region_breakdown))
        .route("/leaderboard/gamemodes", get(get_game_mode_breakdown))
        .route("/leaderboard/around/{player_id}", get(get_around))
        .route("/leaderboard/stats", get(get_leaderboard_stats))
        .route("/leaderboard/recent", get(get_recently_active))
}

#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "leaderboard",
    params(LeaderboardPageQuery),
    responses((status = 200, description = "Leaderboard page", body = LeaderboardPage))
)]
/// Paginated leaderboard under an optional filter.
pub async fn get_page(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LeaderboardPageQuery>>,
) -> Result<Json<ApiResponse<LeaderboardPage>>, AppError> {
    let (limit, offset, filter) = query.into_parts();
    let page = rank_service::page(&state, limit, offset, filter).await?;
    Ok(Json(ApiResponse::new(page)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/top/{n}",
    tag = "leaderboard",
    params(
        ("n" = u64, Path, description = "Number of entries, 1-100"),
        LeaderboardFilterQuery
    ),
    responses((status = 200, description = "Top entries", body = [LeaderboardEntry]))
)]
/// Top N players under an optional filter.
pub async fn get_top(
    State(state): State<SharedState>,
    Path(n): Path<u64>,
    Query(query): Query<LeaderboardFilterQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, AppError> {
    let entries = rank_service::top_n(&state, n, query).await?;
    Ok(Json(ApiResponse::new(entries)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/regions",
    tag = "leaderboard",
    params(LeaderboardFilterQuery),
    responses((status = 200, description = "Per-region breakdown", body = [BreakdownGroup]))
)]
/// Player counts and top slices per region.
pub async fn get_region_breakdown(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardFilterQuery>,
) -> Result<Json<ApiResponse<Vec<BreakdownGroup>>>, AppError> {
    let groups = rank_service::region_breakdown(&state, query).await?;
    Ok(Json(ApiResponse::new(groups)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/gamemodes",
    tag = "leaderboard",
    params(LeaderboardFilterQuery),
    responses((status = 200, description = "Per-game-mode breakdown", body = [BreakdownGroup]))
)]
/// Player counts and top slices per game mode.
pub async fn get_game_mode_breakdown(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardFilterQuery>,
) -> Result<Json<ApiResponse<Vec<BreakdownGroup>>>, AppError> {
    let groups = rank_service::game_mode_breakdown(&state, query).await?;
    Ok(Json(ApiResponse::new(groups)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/around/{player_id}",
    tag = "leaderboard",
    params(
        ("player_id" = Uuid, Path, description = "Target player"),
        AroundQuery
    ),
    responses((status = 200, description = "Rank window around the player", body = AroundResponse))
)]
/// Contiguous rank window centered on one player.
pub async fn get_around(
    State(state): State<SharedState>,
    Path(player_id): Path<Uuid>,
    Query(query): Query<AroundQuery>,
) -> Result<Json<ApiResponse<AroundResponse>>, AppError> {
    let range = query.range.unwrap_or(DEFAULT_AROUND_RANGE);
    let filter = LeaderboardFilterQuery {
        region: query.region,
        game_mode: query.game_mode,
        online_only: query.online_only,
    };
    let window = rank_service::around(&state, player_id, range, filter).await?;
    Ok(Json(ApiResponse::new(window)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/stats",
    tag = "leaderboard",
    params(LeaderboardFilterQuery),
    responses((status = 200, description = "Aggregate statistics", body = LeaderboardStats))
)]
/// Aggregate statistics with region and game-mode distributions.
pub async fn get_leaderboard_stats(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardFilterQuery>,
) -> Result<Json<ApiResponse<LeaderboardStats>>, AppError> {
    let stats = rank_service::stats(&state, query).await?;
    Ok(Json(ApiResponse::new(stats)))
}

#[utoipa::path(
    get,
    path = "/leaderboard/recent",
    tag = "leaderboard",
    params(RecentQuery),
    responses((status = 200, description = "Recently active players", body = [RecentlyActiveEntry]))
)]
/// Players active inside the trailing recency window.
pub async fn get_recently_active(
    State(state): State<SharedState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<ApiResponse<Vec<RecentlyActiveEntry>>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let filter = LeaderboardFilterQuery {
        region: query.region,
        game_mode: query.game_mode,
        online_only: false,
    };
    let entries = rank_service::recently_active(&state, limit, filter).await?;
    Ok(Json(ApiResponse::new(entries)))
}
