use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Score Pulse Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::players::create_player,
        crate::routes::players::get_player,
        crate::routes::players::update_player,
        crate::routes::players::update_score,
        crate::routes::players::get_rank,
        crate::routes::players::record_game_result,
        crate::routes::players::get_stats,
        crate::routes::leaderboard::get_page,
        crate::routes::leaderboard::get_top,
        crate::routes::leaderboard::get_region_breakdown,
        crate::routes::leaderboard::get_game_mode_breakdown,
        crate::routes::leaderboard::get_around,
        crate::routes::leaderboard::get_leaderboard_stats,
        crate::routes::leaderboard::get_recently_active,
        crate::routes::sessions::create_session,
        crate::routes::sessions::list_active_sessions,
        crate::routes::sessions::get_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::leave_session,
        crate::routes::sessions::update_session_score,
        crate::routes::sessions::end_session,
        crate::routes::sessions::get_session_events,
        crate::routes::sessions::get_session_stats,
    ),
    components(
        schemas(
            crate::dao::models::Region,
            crate::dao::models::GameMode,
            crate::dao::models::SessionStatus,
            crate::dao::models::Difficulty,
            crate::dao::models::SessionEventKind,
            crate::dao::models::FinalStanding,
            crate::dto::health::HealthResponse,
            crate::dto::player::CreatePlayerRequest,
            crate::dto::player::UpdatePlayerRequest,
            crate::dto::player::ScoreUpdateRequest,
            crate::dto::player::GameResultRequest,
            crate::dto::player::PlayerResponse,
            crate::dto::player::RankResponse,
            crate::dto::player::PlayerStatsResponse,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dto::leaderboard::LeaderboardPage,
            crate::dto::leaderboard::AroundResponse,
            crate::dto::leaderboard::LeaderboardStats,
            crate::dto::leaderboard::BreakdownGroup,
            crate::dto::leaderboard::RecentlyActiveEntry,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionResponse,
            crate::dto::session::SessionEventView,
            crate::dto::session::SessionStats,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "Player profiles, scores, and ranks"),
        (name = "leaderboard", description = "Filtered leaderboard queries"),
        (name = "sessions", description = "Multiplayer session lifecycle"),
        (name = "live", description = "WebSocket live event surface"),
    )
)]
pub struct ApiDoc;
