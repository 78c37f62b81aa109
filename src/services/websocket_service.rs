//! Live WebSocket connection handling and broadcast routing.
//!
//! Each socket gets a dedicated writer task so broadcasts never block on a
//! slow receiver, and a reader loop that handles inbound events strictly in
//! arrival order. Every event failure is reported back as a typed `error`
//! frame on the originating connection without closing it.

use std::time::{Duration, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameMode, Region},
        score_store::PlayerFilter,
    },
    dto::{
        format_system_time,
        player::ScoreUpdateRequest,
        session::SessionScoreRequest,
        ws::{ClientMessage, ErrorDetail, ServerMessage},
    },
    error::ServiceError,
    services::{player_service, rank_service, session_service},
    state::{
        SharedState,
        channels::{generate_channels, session_channel},
        registry::{ClientConnection, DepartedConnection},
    },
};

/// Handle the full lifecycle for an individual live WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    let mut bound_player: Option<Uuid> = None;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let inbound = match ClientMessage::from_json_str(&text) {
                    Ok(inbound) => inbound,
                    Err(err) => {
                        // One typed error, then the frame is dropped.
                        warn!(%connection_id, error = %err, "dropping unparseable live event");
                        send_error(&outbound_tx, "malformed-payload", "payload could not be parsed");
                        continue;
                    }
                };

                if let Err(err) = dispatch(
                    &state,
                    connection_id,
                    &outbound_tx,
                    &mut bound_player,
                    inbound,
                )
                .await
                {
                    warn!(%connection_id, error = %err, "live event failed");
                    send_error(&outbound_tx, service_error_kind(&err), &err.to_string());
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    teardown(&state, connection_id).await;
    finalize(writer_task, outbound_tx).await;
}

async fn dispatch(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    bound_player: &mut Option<Uuid>,
    inbound: ClientMessage,
) -> Result<(), ServiceError> {
    match inbound {
        ClientMessage::Join {
            player_id,
            game_mode,
        } => handle_join(state, connection_id, tx, bound_player, player_id, game_mode).await,
        ClientMessage::ScoreUpdate {
            player_id,
            score,
            session_id,
        } => handle_score_update(state, tx, *bound_player, player_id, score, session_id).await,
        ClientMessage::StatusUpdate { player_id, online } => {
            handle_status_update(state, *bound_player, player_id, online).await
        }
        ClientMessage::Subscribe { region, game_mode } => {
            handle_subscription(state, *bound_player, region, game_mode, true)
        }
        ClientMessage::Unsubscribe { region, game_mode } => {
            handle_subscription(state, *bound_player, region, game_mode, false)
        }
        ClientMessage::SessionJoin { session_id } => {
            handle_session_room(state, *bound_player, session_id, true)
        }
        ClientMessage::SessionLeave { session_id } => {
            handle_session_room(state, *bound_player, session_id, false)
        }
        ClientMessage::Heartbeat => {
            // Stateless echo: deliberately does not refresh the idle-sweep
            // activity timestamp.
            send_message(
                tx,
                &ServerMessage::HeartbeatAck {
                    server_time: format_system_time(SystemTime::now()),
                },
            );
            Ok(())
        }
        ClientMessage::Unknown => Err(ServiceError::InvalidInput(
            "unsupported event type".into(),
        )),
    }
}

/// Bind the connection to a player (last handshake wins), mark the player
/// online, derive and join the broadcast channels, ack privately, and
/// announce the arrival to everyone else in those channels.
async fn handle_join(
    state: &SharedState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Message>,
    bound_player: &mut Option<Uuid>,
    player_id: Uuid,
    game_mode: Option<GameMode>,
) -> Result<(), ServiceError> {
    let player = player_service::set_online(state, player_id, true).await?;
    let channels = generate_channels(player.region, game_mode);

    let replaced = state.registry().register(ClientConnection {
        connection_id,
        player_id,
        display_name: player.name.clone(),
        region: player.region,
        game_mode,
        last_activity: SystemTime::now(),
        tx: tx.clone(),
    });
    if let Some(previous) = replaced {
        if previous.connection_id != connection_id {
            info!(%player_id, "closing superseded connection after re-join");
            let _ = previous.tx.send(Message::Close(None));
        }
    }
    state.registry().join_channels(player_id, &channels);
    *bound_player = Some(player_id);

    let store = state.require_score_store().await?;
    let rank = rank_service::rank_under_filter(&store, &player, PlayerFilter::default()).await?;

    send_message(
        tx,
        &ServerMessage::Joined {
            player_id,
            name: player.name.clone(),
            score: player.score,
            rank,
            channels: channels.clone(),
        },
    );
    broadcast_to_channels(
        state,
        &channels,
        &ServerMessage::Online {
            player_id,
            name: player.name,
        },
        Some(player_id),
    );

    info!(%player_id, %connection_id, "live connection joined");
    Ok(())
}

async fn handle_score_update(
    state: &SharedState,
    tx: &mpsc::UnboundedSender<Message>,
    bound_player: Option<Uuid>,
    player_id: Uuid,
    score: u32,
    session_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    ensure_owner(bound_player, player_id)?;
    state.registry().touch(player_id);

    state
        .rate_limiter()
        .check(player_id)
        .map_err(|limited| ServiceError::RateLimited {
            retry_after: limited.retry_after,
        })?;

    let player = player_service::write_score(state, player_id, ScoreUpdateRequest { score }).await?;
    if let Some(session_id) = session_id {
        session_service::update_session_score(
            state,
            session_id,
            SessionScoreRequest {
                player_id,
                score,
                delta: None,
                reason: None,
            },
        )
        .await?;
    }

    let store = state.require_score_store().await?;
    let rank = rank_service::rank_under_filter(&store, &player, PlayerFilter::default()).await?;
    send_message(
        tx,
        &ServerMessage::ScoreConfirmed {
            player_id,
            score: player.score,
            rank,
        },
    );

    let subscribed: Vec<String> = state.registry().channels_of(player_id).into_iter().collect();
    broadcast_to_channels(
        state,
        &subscribed,
        &ServerMessage::LeaderboardScoreBroadcast {
            player_id,
            name: player.name.clone(),
            score: player.score,
            region: player.region,
            game_mode: Some(player.game_mode),
        },
        None,
    );

    if let Some(session_id) = session_id {
        broadcast_to_channel(
            state,
            &session_channel(session_id),
            &ServerMessage::SessionScoreBroadcast {
                session_id,
                player_id,
                name: player.name,
                score,
            },
            None,
        );
    }

    Ok(())
}

async fn handle_status_update(
    state: &SharedState,
    bound_player: Option<Uuid>,
    player_id: Uuid,
    online: bool,
) -> Result<(), ServiceError> {
    ensure_owner(bound_player, player_id)?;
    state.registry().touch(player_id);

    let player = player_service::set_online(state, player_id, online).await?;

    let subscribed: Vec<String> = state.registry().channels_of(player_id).into_iter().collect();
    broadcast_to_channels(
        state,
        &subscribed,
        &ServerMessage::StatusChanged {
            player_id,
            name: player.name,
            online,
        },
        None,
    );
    Ok(())
}

/// Merge or remove the channel set derived from (region, game mode). The
/// payload knobs fall back to the values announced at join time so an empty
/// subscribe/unsubscribe round-trips the handshake's channel set exactly.
fn handle_subscription(
    state: &SharedState,
    bound_player: Option<Uuid>,
    region: Option<Region>,
    game_mode: Option<GameMode>,
    subscribe: bool,
) -> Result<(), ServiceError> {
    let player_id = bound_player.ok_or(ServiceError::Unauthenticated)?;
    state.registry().touch(player_id);

    let connection = state
        .registry()
        .connection_of(player_id)
        .ok_or(ServiceError::Unauthenticated)?;
    let channels = generate_channels(
        region.unwrap_or(connection.region),
        game_mode.or(connection.game_mode),
    );

    if subscribe {
        state.registry().join_channels(player_id, &channels);
    } else {
        state.registry().leave_channels(player_id, &channels);
    }
    Ok(())
}

/// Enter or leave a session's transport-level room, announcing the presence
/// change to the other room members. The room is independent of the Session
/// Engine's participant list.
fn handle_session_room(
    state: &SharedState,
    bound_player: Option<Uuid>,
    session_id: Uuid,
    join: bool,
) -> Result<(), ServiceError> {
    let player_id = bound_player.ok_or(ServiceError::Unauthenticated)?;
    state.registry().touch(player_id);

    let connection = state
        .registry()
        .connection_of(player_id)
        .ok_or(ServiceError::Unauthenticated)?;
    let channel = session_channel(session_id);

    if join {
        state
            .registry()
            .join_channels(player_id, std::slice::from_ref(&channel));
        broadcast_to_channel(
            state,
            &channel,
            &ServerMessage::Online {
                player_id,
                name: connection.display_name,
            },
            Some(player_id),
        );
    } else {
        broadcast_to_channel(
            state,
            &channel,
            &ServerMessage::Offline {
                player_id,
                name: connection.display_name,
            },
            Some(player_id),
        );
        state
            .registry()
            .leave_channels(player_id, std::slice::from_ref(&channel));
    }
    Ok(())
}

/// Tear down registry state after the socket closes, marking the player
/// offline best-effort and announcing the departure to the last-known
/// channel set.
async fn teardown(state: &SharedState, connection_id: Uuid) {
    let Some(departed) = state.registry().unregister(connection_id) else {
        return;
    };
    info!(player_id = %departed.player_id, %connection_id, "live connection closed");
    announce_departure(state, &departed).await;
}

async fn announce_departure(state: &SharedState, departed: &DepartedConnection) {
    if let Err(err) = player_service::set_online(state, departed.player_id, false).await {
        // Logged, not retried: the idle sweep and the next join both
        // re-establish the flag.
        warn!(
            player_id = %departed.player_id,
            error = %err,
            "failed to mark player offline on disconnect"
        );
    }

    let channels: Vec<String> = departed.channels.iter().cloned().collect();
    broadcast_to_channels(
        state,
        &channels,
        &ServerMessage::Offline {
            player_id: departed.player_id,
            name: departed.display_name.clone(),
        },
        None,
    );
}

/// Background task bounding memory growth from ungracefully-terminated
/// connections: evicts anything idle past the configured threshold and
/// prunes stale rate-limiter windows.
pub async fn run_idle_sweep(state: SharedState) {
    let interval = state.config().idle_sweep_interval();
    let threshold = state.config().idle_timeout();
    loop {
        sleep(interval).await;
        sweep_idle_connections(&state, threshold).await;
        state.rate_limiter().prune(SystemTime::now());
    }
}

async fn sweep_idle_connections(state: &SharedState, threshold: Duration) {
    let evicted = state.registry().evict_idle(threshold, SystemTime::now());
    for departed in evicted {
        info!(player_id = %departed.player_id, "evicting idle connection");
        let _ = departed.tx.send(Message::Close(None));
        announce_departure(state, &departed).await;
    }
}

fn ensure_owner(bound_player: Option<Uuid>, target: Uuid) -> Result<(), ServiceError> {
    match bound_player {
        None => Err(ServiceError::Unauthenticated),
        Some(owner) if owner == target => Ok(()),
        Some(_) => Err(ServiceError::Unauthorized(format!(
            "connection is not bound to player `{target}`"
        ))),
    }
}

fn service_error_kind(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Unavailable(_) | ServiceError::Degraded => "internal-error",
        ServiceError::Unauthorized(_) => "unauthorized",
        ServiceError::Unauthenticated => "unauthenticated",
        ServiceError::InvalidInput(_) => "validation-error",
        ServiceError::NotFound(_) => "not-found",
        ServiceError::Conflict(_) => "conflict",
        ServiceError::RateLimited { .. } => "rate-limited",
    }
}

/// Serialize a payload and push it onto the provided writer channel.
/// Serialization failures are logged and swallowed; a closed writer just
/// drops the frame (the reader loop notices the closure on its own).
fn send_message<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message `{value:?}`");
            return;
        }
    };
    let _ = tx.send(Message::Text(payload.into()));
}

fn send_error(tx: &mpsc::UnboundedSender<Message>, kind: &'static str, message: &str) {
    send_message(
        tx,
        &ServerMessage::Error {
            error: ErrorDetail {
                kind,
                message: message.to_owned(),
            },
        },
    );
}

/// Fan a message out to one channel. Fire-and-forget: no acknowledgment is
/// awaited and slow receivers exert no backpressure on the sender.
pub fn broadcast_to_channel(
    state: &SharedState,
    channel: &str,
    message: &ServerMessage,
    exclude: Option<Uuid>,
) {
    let Ok(payload) = serde_json::to_string(message) else {
        warn!(channel, "failed to serialize broadcast message");
        return;
    };
    state
        .registry()
        .broadcast(channel, Message::Text(payload.into()), exclude);
}

/// Fan a message out to several channels, serializing once and deduplicating
/// receivers subscribed to more than one of them.
pub fn broadcast_to_channels(
    state: &SharedState,
    channels: &[String],
    message: &ServerMessage,
    exclude: Option<Uuid>,
) {
    let Ok(payload) = serde_json::to_string(message) else {
        warn!("failed to serialize broadcast message");
        return;
    };
    state
        .registry()
        .broadcast_many(channels, Message::Text(payload.into()), exclude);
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::Region,
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
                region: Some(Region::Eu),
                game_mode: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn recv_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        match rx.try_recv().expect("expected an outbound frame") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_binds_the_connection_and_acks() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice").await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bound = None;

        handle_join(&state, Uuid::new_v4(), &tx, &mut bound, alice, None)
            .await
            .unwrap();

        assert_eq!(bound, Some(alice));
        assert_eq!(state.registry().connection_count(), 1);
        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "joined");
        assert_eq!(ack["rank"], 1);
        assert_eq!(
            ack["channels"],
            serde_json::json!(["global", "region:eu"])
        );

        // The join also flips the durable online flag.
        let store = state.require_score_store().await.unwrap();
        let entity = player_service::load_player(&store, alice).await.unwrap();
        assert!(entity.online);
    }

    #[tokio::test]
    async fn join_of_unknown_player_fails_without_registering() {
        let state = test_state().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut bound = None;

        let err = handle_join(&state, Uuid::new_v4(), &tx, &mut bound, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(bound.is_none());
        assert_eq!(state.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn score_update_enforces_connection_ownership() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = handle_score_update(&state, &tx, Some(alice), bob, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = handle_score_update(&state, &tx, None, alice, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn score_update_confirms_and_broadcasts_to_subscribers() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice").await;
        let bob = seed_player(&state, "bob").await;

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let mut alice_bound = None;
        handle_join(&state, Uuid::new_v4(), &alice_tx, &mut alice_bound, alice, None)
            .await
            .unwrap();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let mut bob_bound = None;
        handle_join(&state, Uuid::new_v4(), &bob_tx, &mut bob_bound, bob, None)
            .await
            .unwrap();

        // Drain the join ack plus any online notifications.
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        handle_score_update(&state, &alice_tx, alice_bound, alice, 1500, None)
            .await
            .unwrap();

        let confirm = recv_json(&mut alice_rx);
        assert_eq!(confirm["type"], "score-confirmed");
        assert_eq!(confirm["score"], 1500);
        assert_eq!(confirm["rank"], 1);

        // Bob shares the region channels, so he sees the broadcast.
        let broadcast = recv_json(&mut bob_rx);
        assert_eq!(broadcast["type"], "leaderboard-score-broadcast");
        assert_eq!(broadcast["score"], 1500);
    }

    #[tokio::test]
    async fn subscribe_requires_a_prior_join() {
        let state = test_state().await;
        let err = handle_subscription(&state, None, None, None, true).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated));
    }

    #[tokio::test]
    async fn unsubscribing_the_join_set_empties_the_memberships() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut bound = None;
        handle_join(&state, Uuid::new_v4(), &tx, &mut bound, alice, None)
            .await
            .unwrap();
        assert!(!state.registry().channels_of(alice).is_empty());

        handle_subscription(&state, bound, None, None, false).unwrap();
        assert!(state.registry().channels_of(alice).is_empty());
    }

    #[tokio::test]
    async fn idle_sweep_closes_and_purges_stale_connections() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice").await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bound = None;
        handle_join(&state, Uuid::new_v4(), &tx, &mut bound, alice, None)
            .await
            .unwrap();
        while rx.try_recv().is_ok() {}

        state
            .registry()
            .touch_at(alice, SystemTime::now() - Duration::from_secs(11 * 60));
        sweep_idle_connections(&state, Duration::from_secs(10 * 60)).await;

        assert_eq!(state.registry().connection_count(), 0);
        assert!(matches!(rx.try_recv(), Ok(Message::Close(_))));

        let store = state.require_score_store().await.unwrap();
        let entity = player_service::load_player(&store, alice).await.unwrap();
        assert!(!entity.online);
    }
}
