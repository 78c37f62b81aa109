/// OpenAPI document assembly.
pub mod documentation;
/// Health probe aggregation.
pub mod health_service;
/// Player CRUD and the derived-field score write rule.
pub mod player_service;
/// Rank Query Engine: leaderboard slices, ranks, and aggregates.
pub mod rank_service;
/// Session Engine: multiplayer match lifecycle and positional bonuses.
pub mod session_service;
/// Live WebSocket connection handling and broadcast routing.
pub mod websocket_service;
