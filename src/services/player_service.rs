use std::sync::Arc;
use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::{models::PlayerEntity, score_store::ScoreStore},
    dto::player::{
        CreatePlayerRequest, GameOutcome, GameResultRequest, PlayerResponse, PlayerStatsResponse,
        ScoreUpdateRequest, UpdatePlayerRequest,
    },
    error::ServiceError,
    state::SharedState,
};

const ACHIEVEMENT_FIRST_WIN: &str = "first-win";
const ACHIEVEMENT_VETERAN: &str = "veteran";
const ACHIEVEMENT_SHARPSHOOTER: &str = "sharpshooter";
const VETERAN_GAMES: u32 = 100;
const SHARPSHOOTER_SCORE: u32 = 10_000;

/// Register a new player after checking display-name uniqueness.
pub async fn create_player(
    state: &SharedState,
    request: CreatePlayerRequest,
) -> Result<PlayerResponse, ServiceError> {
    let store = state.require_score_store().await?;

    if store
        .find_player_by_name(request.name.clone())
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict(format!(
            "display name `{}` is already taken",
            request.name
        )));
    }

    let player = PlayerEntity::new(
        request.name,
        request.region.unwrap_or_default(),
        request.game_mode.unwrap_or_default(),
    );
    store.upsert_player(player.clone()).await?;
    Ok(player.into())
}

/// Fetch a player view by id.
pub async fn get_player(state: &SharedState, id: Uuid) -> Result<PlayerResponse, ServiceError> {
    let store = state.require_score_store().await?;
    Ok(load_player(&store, id).await?.into())
}

/// Apply a partial profile update.
pub async fn update_player(
    state: &SharedState,
    id: Uuid,
    request: UpdatePlayerRequest,
) -> Result<PlayerResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut player = load_player(&store, id).await?;

    if let Some(name) = request.name {
        if name != player.name {
            if store.find_player_by_name(name.clone()).await?.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "display name `{name}` is already taken"
                )));
            }
            player.name = name;
        }
    }
    if let Some(region) = request.region {
        player.region = region;
    }
    if let Some(game_mode) = request.game_mode {
        player.game_mode = game_mode;
    }
    if let Some(online) = request.online {
        player.online = online;
    }
    player.updated_at = SystemTime::now();

    store.upsert_player(player.clone()).await?;
    Ok(player.into())
}

/// Write a new current score, re-establishing the derived fields.
///
/// Returns the updated entity so live-event callers can reuse it for rank
/// lookups and broadcasts. Concurrent writes to the same player resolve
/// last-write-wins at the store; this function is the single point where an
/// optimistic-concurrency policy could be slotted in later.
pub async fn write_score(
    state: &SharedState,
    id: Uuid,
    request: ScoreUpdateRequest,
) -> Result<PlayerEntity, ServiceError> {
    let store = state.require_score_store().await?;
    let mut player = load_player(&store, id).await?;
    player.write_score(request.score);
    store.upsert_player(player.clone()).await?;
    Ok(player)
}

/// Toggle the online flag, refreshing the activity timestamp.
pub async fn set_online(
    state: &SharedState,
    id: Uuid,
    online: bool,
) -> Result<PlayerEntity, ServiceError> {
    let store = state.require_score_store().await?;
    let mut player = load_player(&store, id).await?;
    let now = SystemTime::now();
    player.online = online;
    player.last_active = now;
    player.updated_at = now;
    store.upsert_player(player.clone()).await?;
    Ok(player)
}

/// Append a finished game: bump the outcome counter, write the score, and
/// unlock any milestone achievements the new totals reach.
pub async fn record_game_result(
    state: &SharedState,
    id: Uuid,
    request: GameResultRequest,
) -> Result<PlayerResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut player = load_player(&store, id).await?;

    player.games_played += 1;
    match request.outcome {
        GameOutcome::Win => player.wins += 1,
        GameOutcome::Loss => player.losses += 1,
        GameOutcome::Draw => player.draws += 1,
    }
    player.write_score(request.score);

    if player.wins >= 1 {
        player.unlock_achievement(ACHIEVEMENT_FIRST_WIN);
    }
    if player.games_played >= VETERAN_GAMES {
        player.unlock_achievement(ACHIEVEMENT_VETERAN);
    }
    if player.best_score >= SHARPSHOOTER_SCORE {
        player.unlock_achievement(ACHIEVEMENT_SHARPSHOOTER);
    }

    store.upsert_player(player.clone()).await?;
    Ok(player.into())
}

/// Derived statistics view for one player.
pub async fn get_stats(
    state: &SharedState,
    id: Uuid,
) -> Result<PlayerStatsResponse, ServiceError> {
    let store = state.require_score_store().await?;
    Ok(load_player(&store, id).await?.into())
}

pub(crate) async fn load_player(
    store: &Arc<dyn ScoreStore>,
    id: Uuid,
) -> Result<PlayerEntity, ServiceError> {
    store
        .find_player(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player `{id}` not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::{GameMode, Region},
        dao::score_store::memory::MemoryScoreStore,
        state::AppState,
    };

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_score_store(Arc::new(MemoryScoreStore::new()))
            .await;
        state
    }

    fn create_request(name: &str) -> CreatePlayerRequest {
        CreatePlayerRequest {
            name: name.into(),
            region: Some(Region::Na),
            game_mode: Some(GameMode::Ranked),
        }
    }

    #[tokio::test]
    async fn duplicate_display_name_conflicts() {
        let state = test_state().await;
        create_player(&state, create_request("alice")).await.unwrap();
        let err = create_player(&state, create_request("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn score_write_updates_derived_fields() {
        let state = test_state().await;
        let created = create_player(&state, create_request("bob")).await.unwrap();

        let player = write_score(&state, created.id, ScoreUpdateRequest { score: 1500 })
            .await
            .unwrap();
        assert_eq!(player.score, 1500);
        assert_eq!(player.best_score, 1500);

        let player = write_score(&state, created.id, ScoreUpdateRequest { score: 700 })
            .await
            .unwrap();
        assert_eq!(player.score, 700);
        assert_eq!(player.best_score, 1500);
        // Not a running average: the current score over max(games, 1).
        assert_eq!(player.average_score, 700);
    }

    #[tokio::test]
    async fn game_results_unlock_milestones_once() {
        let state = test_state().await;
        let created = create_player(&state, create_request("carol")).await.unwrap();

        let first = record_game_result(
            &state,
            created.id,
            GameResultRequest {
                outcome: GameOutcome::Win,
                score: 12_000,
            },
        )
        .await
        .unwrap();
        let names: Vec<&str> = first.achievements.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"first-win"));
        assert!(names.contains(&"sharpshooter"));

        let second = record_game_result(
            &state,
            created.id,
            GameResultRequest {
                outcome: GameOutcome::Win,
                score: 11_000,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            second
                .achievements
                .iter()
                .filter(|a| a.name == "first-win")
                .count(),
            1
        );
        assert_eq!(second.wins, 2);
        assert_eq!(second.games_played, 2);
    }

    #[tokio::test]
    async fn unknown_player_is_not_found() {
        let state = test_state().await;
        let err = get_player(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
