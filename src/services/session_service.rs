//! Session Engine.
//!
//! Sessions move `waiting -> active -> completed`, with `abandoned` as the
//! alternate terminal whenever the active-participant count drops to zero.
//! Transitions are monotonic: nothing ever returns to `waiting`, and
//! `completed` is final.

use std::time::SystemTime;

use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{
        FinalStanding, ParticipantEntity, SessionEntity, SessionEventKind, SessionStatus,
    },
    dto::{
        session::{
            CreateSessionRequest, SessionEventView, SessionResponse, SessionScoreRequest,
            SessionStats,
        },
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{player_service, websocket_service},
    state::{SharedState, channels::session_channel},
};

/// Participant count at which a waiting session starts.
const ACTIVATION_THRESHOLD: usize = 2;

/// Open a new session in the waiting state.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let session = SessionEntity::new(
        request.game_mode,
        request.region.unwrap_or_default(),
        request.max_players.unwrap_or(4),
        request.settings.unwrap_or_default().into(),
    );
    store.save_session(session.clone()).await?;
    Ok(session.into())
}

/// Fetch one session by id.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionResponse, ServiceError> {
    Ok(load_session(state, id).await?.into())
}

/// Add a player to a session.
///
/// Idempotent for players already present. Crossing the two-participant
/// threshold activates a waiting session exactly once.
pub async fn join_session(
    state: &SharedState,
    id: Uuid,
    player_id: Uuid,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut session = load_session(state, id).await?;

    if session.participant(player_id).is_some() {
        return Ok(session.into());
    }

    if !matches!(
        session.status,
        SessionStatus::Waiting | SessionStatus::Active
    ) {
        return Err(ServiceError::Conflict(format!(
            "session `{id}` is not joinable"
        )));
    }
    if session.is_full() {
        return Err(ServiceError::Conflict(format!("session `{id}` is full")));
    }

    let player = player_service::load_player(&store, player_id).await?;
    session.participants.push(ParticipantEntity {
        player_id,
        name: player.name.clone(),
        score_at_join: player.score,
        score: 0,
        final_position: None,
        active: true,
    });
    session.push_event(SessionEventKind::PlayerJoined {
        player_id,
        name: player.name,
    });

    if session.status == SessionStatus::Waiting
        && session.active_count() >= ACTIVATION_THRESHOLD
    {
        session.status = SessionStatus::Active;
        session.started_at = Some(SystemTime::now());
        session.push_event(SessionEventKind::GameStarted {
            player_count: session.active_count() as u32,
        });
    }

    store.save_session(session.clone()).await?;
    Ok(session.into())
}

/// Soft-remove a player, keeping the slot for history. The session is
/// abandoned when its last active participant leaves before completion.
pub async fn leave_session(
    state: &SharedState,
    id: Uuid,
    player_id: Uuid,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut session = load_session(state, id).await?;

    let participant = session
        .participant_mut(player_id)
        .ok_or_else(|| ServiceError::NotFound(format!("player `{player_id}` not in session")))?;

    if participant.active {
        participant.active = false;
        session.push_event(SessionEventKind::PlayerLeft { player_id });

        if session.active_count() == 0
            && matches!(
                session.status,
                SessionStatus::Waiting | SessionStatus::Active
            )
        {
            session.status = SessionStatus::Abandoned;
        }

        store.save_session(session.clone()).await?;
    }

    Ok(session.into())
}

/// Overwrite a participant's in-session score (last write wins, not
/// delta-accumulated) and record the change in the event log.
pub async fn update_session_score(
    state: &SharedState,
    id: Uuid,
    request: SessionScoreRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut session = load_session(state, id).await?;

    if session.status != SessionStatus::Active {
        return Err(ServiceError::NotFound(format!(
            "session `{id}` is not active"
        )));
    }

    let participant = session
        .participant_mut(request.player_id)
        .filter(|p| p.active)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("player `{}` not in session", request.player_id))
        })?;

    let previous = participant.score;
    participant.score = request.score;
    let delta = request
        .delta
        .unwrap_or(i64::from(request.score) - i64::from(previous));
    session.push_event(SessionEventKind::ScoreChanged {
        player_id: request.player_id,
        score: request.score,
        delta,
        reason: request.reason,
    });

    store.save_session(session.clone()).await?;
    Ok(session.into())
}

/// Complete an active session: assign final positions, append the scoreboard
/// event, write positional bonuses through to durable player scores, and
/// announce the result to the session's live room.
pub async fn end_session(state: &SharedState, id: Uuid) -> Result<SessionResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let mut session = load_session(state, id).await?;

    if session.status != SessionStatus::Active {
        return Err(ServiceError::NotFound(format!(
            "session `{id}` is not active"
        )));
    }

    // Stable sort keeps join order among tied scores, so positions stay
    // deterministic without an explicit tie-break rule.
    let mut standings: Vec<(Uuid, String, u32)> = session
        .participants
        .iter()
        .filter(|p| p.active)
        .map(|p| (p.player_id, p.name.clone(), p.score))
        .collect();
    standings.sort_by_key(|(_, _, score)| std::cmp::Reverse(*score));

    let total_players = standings.len() as u32;
    let scoreboard: Vec<FinalStanding> = standings
        .into_iter()
        .enumerate()
        .map(|(index, (player_id, name, score))| {
            let position = index as u32 + 1;
            FinalStanding {
                player_id,
                name,
                score,
                position,
                bonus: positional_bonus(total_players, position),
            }
        })
        .collect();

    for standing in &scoreboard {
        if let Some(participant) = session.participant_mut(standing.player_id) {
            participant.final_position = Some(standing.position);
        }
    }

    let now = SystemTime::now();
    session.status = SessionStatus::Completed;
    session.ended_at = Some(now);
    session.duration_secs = Some(
        now.duration_since(session.started_at.unwrap_or(session.created_at))
            .unwrap_or_default()
            .as_secs(),
    );
    session.push_event(SessionEventKind::GameEnded {
        scoreboard: scoreboard.clone(),
    });

    store.save_session(session.clone()).await?;

    // Write-back of bonus-adjusted scores is best-effort per player: the
    // session itself is already settled.
    for standing in &scoreboard {
        let final_score = standing.score.saturating_add(standing.bonus);
        if let Err(err) = player_service::write_score(
            state,
            standing.player_id,
            crate::dto::player::ScoreUpdateRequest { score: final_score },
        )
        .await
        {
            warn!(
                session_id = %id,
                player_id = %standing.player_id,
                error = %err,
                "failed to write positional bonus back to player score"
            );
        }
    }

    websocket_service::broadcast_to_channel(
        state,
        &session_channel(id),
        &ServerMessage::SessionEnded {
            session_id: id,
            scoreboard,
        },
        None,
    );

    Ok(session.into())
}

/// Sessions currently waiting for players or being played.
pub async fn list_active(state: &SharedState) -> Result<Vec<SessionResponse>, ServiceError> {
    let store = state.require_score_store().await?;
    let mut sessions = store.list_sessions(Some(SessionStatus::Active)).await?;
    sessions.extend(store.list_sessions(Some(SessionStatus::Waiting)).await?);
    sessions.sort_by_key(|s| s.created_at);
    Ok(sessions.into_iter().map(Into::into).collect())
}

/// Full event log of one session.
pub async fn session_events(
    state: &SharedState,
    id: Uuid,
) -> Result<Vec<SessionEventView>, ServiceError> {
    let session = load_session(state, id).await?;
    Ok(session.events.into_iter().map(Into::into).collect())
}

/// Aggregate counts and durations over every stored session.
pub async fn session_stats(state: &SharedState) -> Result<SessionStats, ServiceError> {
    let store = state.require_score_store().await?;
    let sessions = store.list_sessions(None).await?;

    let mut stats = SessionStats {
        total: sessions.len() as u64,
        waiting: 0,
        active: 0,
        completed: 0,
        abandoned: 0,
        average_duration_secs: None,
        by_game_mode: indexmap::IndexMap::new(),
    };

    let mut completed_durations: Vec<u64> = Vec::new();
    for session in &sessions {
        match session.status {
            SessionStatus::Waiting => stats.waiting += 1,
            SessionStatus::Active => stats.active += 1,
            SessionStatus::Completed => stats.completed += 1,
            SessionStatus::Abandoned => stats.abandoned += 1,
        }
        if let Some(duration) = session.duration_secs {
            completed_durations.push(duration);
        }
        *stats
            .by_game_mode
            .entry(session.game_mode.label().to_owned())
            .or_insert(0) += 1;
    }

    if !completed_durations.is_empty() {
        let sum: u64 = completed_durations.iter().sum();
        stats.average_duration_secs = Some(sum as f64 / completed_durations.len() as f64);
    }

    Ok(stats)
}

/// Linear positional bonus: first place earns the full 100, decaying to
/// `100 / total` for last place. Solo sessions earn nothing.
fn positional_bonus(total_players: u32, position: u32) -> u32 {
    if total_players < 2 {
        return 0;
    }
    let share = f64::from(100 * (total_players - position + 1)) / f64::from(total_players);
    share.round() as u32
}

async fn load_session(state: &SharedState, id: Uuid) -> Result<SessionEntity, ServiceError> {
    let store = state.require_score_store().await?;
    store
        .find_session(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::{GameMode, Region},
        dao::score_store::memory::MemoryScoreStore,
        dto::player::CreatePlayerRequest,
        state::AppState,
    };
    use std::sync::Arc;

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_score_store(Arc::new(MemoryScoreStore::new()))
            .await;
        state
    }

    async fn seed_player(state: &SharedState, name: &str) -> Uuid {
        player_service::create_player(
            state,
            CreatePlayerRequest {
                name: name.into(),
                region: Some(Region::Na),
                game_mode: Some(GameMode::Blitz),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn seed_session(state: &SharedState, max_players: u32) -> Uuid {
        create_session(
            state,
            CreateSessionRequest {
                game_mode: GameMode::Blitz,
                region: Some(Region::Na),
                max_players: Some(max_players),
                settings: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn score_request(player_id: Uuid, score: u32) -> SessionScoreRequest {
        SessionScoreRequest {
            player_id,
            score,
            delta: None,
            reason: None,
        }
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;

        let first = join_session(&state, session, alice).await.unwrap();
        let second = join_session(&state, session, alice).await.unwrap();
        assert_eq!(first.participants.len(), 1);
        assert_eq!(second.participants.len(), 1);

        // No duplicate join event either.
        let events = session_events(&state, session).await.unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e.kind, SessionEventKind::PlayerJoined { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn session_activates_exactly_at_two_participants() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        let carol = seed_player(&state, "carol").await;

        let after_one = join_session(&state, session, alice).await.unwrap();
        assert_eq!(after_one.status, SessionStatus::Waiting);
        assert!(after_one.started_at.is_none());

        let after_two = join_session(&state, session, bob).await.unwrap();
        assert_eq!(after_two.status, SessionStatus::Active);
        assert!(after_two.started_at.is_some());

        // A third join keeps the session active without a second start event.
        join_session(&state, session, carol).await.unwrap();
        let events = session_events(&state, session).await.unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e.kind, SessionEventKind::GameStarted { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn full_session_rejects_joins() {
        let state = test_state().await;
        let session = seed_session(&state, 2).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        let carol = seed_player(&state, "carol").await;

        join_session(&state, session, alice).await.unwrap();
        join_session(&state, session, bob).await.unwrap();
        let err = join_session(&state, session, carol).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn last_leaver_abandons_the_session() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;

        join_session(&state, session, alice).await.unwrap();
        join_session(&state, session, bob).await.unwrap();

        let after_first = leave_session(&state, session, alice).await.unwrap();
        assert_eq!(after_first.status, SessionStatus::Active);

        let after_second = leave_session(&state, session, bob).await.unwrap();
        assert_eq!(after_second.status, SessionStatus::Abandoned);

        // Terminal: no joining an abandoned session.
        let carol = seed_player(&state, "carol").await;
        assert!(matches!(
            join_session(&state, session, carol).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn score_updates_require_an_active_session() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        join_session(&state, session, alice).await.unwrap();

        let err = update_session_score(&state, session, score_request(alice, 50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn score_updates_are_last_write_wins() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        join_session(&state, session, alice).await.unwrap();
        join_session(&state, session, bob).await.unwrap();

        update_session_score(&state, session, score_request(alice, 100))
            .await
            .unwrap();
        let updated = update_session_score(&state, session, score_request(alice, 40))
            .await
            .unwrap();

        let participant = updated
            .participants
            .iter()
            .find(|p| p.player_id == alice)
            .unwrap();
        // Overwritten, not accumulated.
        assert_eq!(participant.score, 40);
    }

    #[tokio::test]
    async fn end_assigns_positions_and_writes_bonuses_back() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        let carol = seed_player(&state, "carol").await;
        for player in [alice, bob, carol] {
            join_session(&state, session, player).await.unwrap();
        }

        update_session_score(&state, session, score_request(alice, 300))
            .await
            .unwrap();
        update_session_score(&state, session, score_request(bob, 500))
            .await
            .unwrap();
        update_session_score(&state, session, score_request(carol, 100))
            .await
            .unwrap();

        let ended = end_session(&state, session).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.ended_at.is_some());

        let position_of = |id: Uuid| {
            ended
                .participants
                .iter()
                .find(|p| p.player_id == id)
                .unwrap()
                .final_position
                .unwrap()
        };
        assert_eq!(position_of(bob), 1);
        assert_eq!(position_of(alice), 2);
        assert_eq!(position_of(carol), 3);

        // bonus = round(100 * (K - position + 1) / K) with K = 3.
        let store = state.require_score_store().await.unwrap();
        let bob_entity = player_service::load_player(&store, bob).await.unwrap();
        assert_eq!(bob_entity.score, 500 + 100);
        let alice_entity = player_service::load_player(&store, alice).await.unwrap();
        assert_eq!(alice_entity.score, 300 + 67);
        let carol_entity = player_service::load_player(&store, carol).await.unwrap();
        assert_eq!(carol_entity.score, 100 + 33);

        // Completed is terminal: ending again fails, as does rejoining.
        assert!(matches!(
            end_session(&state, session).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ending_a_waiting_session_is_not_found() {
        let state = test_state().await;
        let session = seed_session(&state, 4).await;
        assert!(matches!(
            end_session(&state, session).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn solo_bonus_is_zero() {
        assert_eq!(positional_bonus(1, 1), 0);
        assert_eq!(positional_bonus(2, 1), 100);
        assert_eq!(positional_bonus(2, 2), 50);
        assert_eq!(positional_bonus(3, 2), 67);
        assert_eq!(positional_bonus(4, 4), 25);
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let state = test_state().await;
        let s1 = seed_session(&state, 4).await;
        let _s2 = seed_session(&state, 4).await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        join_session(&state, s1, alice).await.unwrap();
        join_session(&state, s1, bob).await.unwrap();
        end_session(&state, s1).await.unwrap();

        let stats = session_stats(&state).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.waiting, 1);
        assert!(stats.average_duration_secs.is_some());
        assert_eq!(stats.by_game_mode["BLITZ"], 2);
    }
}
