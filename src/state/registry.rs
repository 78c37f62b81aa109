//! Live connection registry and broadcast router.
//!
//! Process-local only: nothing here is persisted, and the whole structure is
//! rebuilt from scratch when the server restarts. Each map is keyed so that
//! read-modify-write sequences for one player hit a single `DashMap` entry
//! lock, which makes operations on the same player id linearizable relative
//! to each other.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dao::models::{GameMode, Region};

/// Handle used to push frames to one live socket, plus the join context the
/// broadcast router needs.
#[derive(Clone)]
pub struct ClientConnection {
    /// Identifier of the underlying socket, distinct from the player.
    pub connection_id: Uuid,
    /// Player this socket authenticated as.
    pub player_id: Uuid,
    /// Display name snapshotted at join time.
    pub display_name: String,
    /// Region announced at join time.
    pub region: Region,
    /// Game mode announced at join time, if any.
    pub game_mode: Option<GameMode>,
    /// Last inbound activity, used by the idle sweep.
    pub last_activity: SystemTime,
    /// Writer-task channel for outbound frames.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// State handed back when a connection is torn down, so the caller can
/// broadcast the departure to the right audience.
pub struct DepartedConnection {
    pub player_id: Uuid,
    pub display_name: String,
    pub channels: HashSet<String>,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of live connections, their channel subscriptions, and the
/// reverse maps needed to route broadcasts.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// player id -> live connection (last handshake wins).
    players: DashMap<Uuid, ClientConnection>,
    /// connection id -> player id.
    connections: DashMap<Uuid, Uuid>,
    /// player id -> subscribed channel names.
    subscriptions: DashMap<Uuid, HashSet<String>>,
    /// channel name -> member player ids, maintained for O(members) fan-out.
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to its player. If the player already had a live
    /// connection the previous one is unbound and returned so the caller can
    /// close its socket (last handshake wins). The previous connection's
    /// subscriptions are purged; the caller re-derives the channel set.
    pub fn register(&self, connection: ClientConnection) -> Option<ClientConnection> {
        let player_id = connection.player_id;
        self.connections
            .insert(connection.connection_id, player_id);

        let replaced = self.players.insert(player_id, connection);
        if let Some(previous) = &replaced {
            self.connections.remove(&previous.connection_id);
            self.purge_channels(player_id);
        }
        replaced
    }

    /// Player currently bound to a connection.
    pub fn player_for_connection(&self, connection_id: Uuid) -> Option<Uuid> {
        self.connections.get(&connection_id).map(|e| *e.value())
    }

    /// Writer channel for a player's live connection.
    pub fn sender_for(&self, player_id: Uuid) -> Option<mpsc::UnboundedSender<Message>> {
        self.players.get(&player_id).map(|e| e.tx.clone())
    }

    /// Snapshot of a player's live connection, if any.
    pub fn connection_of(&self, player_id: Uuid) -> Option<ClientConnection> {
        self.players.get(&player_id).map(|e| e.value().clone())
    }

    /// Record inbound activity now.
    pub fn touch(&self, player_id: Uuid) {
        self.touch_at(player_id, SystemTime::now());
    }

    /// Record inbound activity at an explicit instant.
    pub fn touch_at(&self, player_id: Uuid, at: SystemTime) {
        if let Some(mut connection) = self.players.get_mut(&player_id) {
            connection.last_activity = at;
        }
    }

    /// Add the player to every listed channel.
    pub fn join_channels(&self, player_id: Uuid, channels: &[String]) {
        let mut subscribed = self.subscriptions.entry(player_id).or_default();
        for channel in channels {
            if subscribed.insert(channel.clone()) {
                self.rooms
                    .entry(channel.clone())
                    .or_default()
                    .insert(player_id);
            }
        }
    }

    /// Remove the player from every listed channel.
    pub fn leave_channels(&self, player_id: Uuid, channels: &[String]) {
        if let Some(mut subscribed) = self.subscriptions.get_mut(&player_id) {
            for channel in channels {
                subscribed.remove(channel);
            }
        }
        for channel in channels {
            if let Some(mut members) = self.rooms.get_mut(channel) {
                members.remove(&player_id);
            }
        }
        self.drop_empty_rooms(channels);
    }

    /// Snapshot of the channels a player is subscribed to.
    pub fn channels_of(&self, player_id: Uuid) -> HashSet<String> {
        self.subscriptions
            .get(&player_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Send a frame to every member of a channel, optionally excluding one
    /// player (typically the originator). Delivery is fire-and-forget: a
    /// closed writer just drops the frame.
    pub fn broadcast(&self, channel: &str, message: Message, exclude: Option<Uuid>) {
        let members: Vec<Uuid> = match self.rooms.get(channel) {
            Some(room) => room
                .iter()
                .copied()
                .filter(|member| Some(*member) != exclude)
                .collect(),
            None => return,
        };

        for member in members {
            if let Some(connection) = self.players.get(&member) {
                let _ = connection.tx.send(message.clone());
            }
        }
    }

    /// Send the same frame to several channels, deduplicating members that
    /// subscribe to more than one of them.
    pub fn broadcast_many<'a>(
        &self,
        channels: impl IntoIterator<Item = &'a String>,
        message: Message,
        exclude: Option<Uuid>,
    ) {
        let mut targets: HashSet<Uuid> = HashSet::new();
        for channel in channels {
            if let Some(room) = self.rooms.get(channel.as_str()) {
                targets.extend(room.iter().copied());
            }
        }
        if let Some(excluded) = exclude {
            targets.remove(&excluded);
        }

        for member in targets {
            if let Some(connection) = self.players.get(&member) {
                let _ = connection.tx.send(message.clone());
            }
        }
    }

    /// Tear down the registry state for a connection.
    ///
    /// A no-op when the connection is not the player's current one: after a
    /// last-handshake-wins replacement, the stale socket's teardown must not
    /// purge the newer binding.
    pub fn unregister(&self, connection_id: Uuid) -> Option<DepartedConnection> {
        let player_id = *self.connections.get(&connection_id)?.value();

        let current = self.players.get(&player_id)?;
        if current.connection_id != connection_id {
            self.connections.remove(&connection_id);
            return None;
        }
        drop(current);

        self.connections.remove(&connection_id);
        let connection = self.players.remove(&player_id).map(|(_, c)| c)?;
        let channels = self.purge_channels(player_id);

        Some(DepartedConnection {
            player_id,
            display_name: connection.display_name,
            channels,
            tx: connection.tx,
        })
    }

    /// Evict every connection idle longer than `threshold`, returning the
    /// departed state for each so the caller can close sockets and announce
    /// the departures.
    pub fn evict_idle(&self, threshold: Duration, now: SystemTime) -> Vec<DepartedConnection> {
        let stale: Vec<Uuid> = self
            .players
            .iter()
            .filter(|entry| {
                now.duration_since(entry.last_activity)
                    .map(|idle| idle > threshold)
                    .unwrap_or(false)
            })
            .map(|entry| entry.connection_id)
            .collect();

        stale
            .into_iter()
            .filter_map(|connection_id| self.unregister(connection_id))
            .collect()
    }

    /// Number of live connections, for the health probe.
    pub fn connection_count(&self) -> usize {
        self.players.len()
    }

    fn purge_channels(&self, player_id: Uuid) -> HashSet<String> {
        let channels = self
            .subscriptions
            .remove(&player_id)
            .map(|(_, set)| set)
            .unwrap_or_default();
        for channel in &channels {
            if let Some(mut members) = self.rooms.get_mut(channel) {
                members.remove(&player_id);
            }
        }
        let channel_list: Vec<String> = channels.iter().cloned().collect();
        self.drop_empty_rooms(&channel_list);
        channels
    }

    fn drop_empty_rooms(&self, channels: &[String]) {
        for channel in channels {
            self.rooms
                .remove_if(channel, |_, members| members.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(player_id: Uuid) -> (ClientConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ClientConnection {
                connection_id: Uuid::new_v4(),
                player_id,
                display_name: "tester".into(),
                region: Region::Eu,
                game_mode: None,
                last_activity: SystemTime::now(),
                tx,
            },
            rx,
        )
    }

    #[test]
    fn register_unregister_round_trip() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (conn, _rx) = connection(player);
        let connection_id = conn.connection_id;

        assert!(registry.register(conn).is_none());
        registry.join_channels(player, &["global".into(), "region:eu".into()]);
        assert_eq!(registry.connection_count(), 1);

        let departed = registry.unregister(connection_id).unwrap();
        assert_eq!(departed.player_id, player);
        assert!(departed.channels.contains("global"));
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.channels_of(player).is_empty());
    }

    #[test]
    fn last_handshake_wins_and_stale_teardown_is_ignored() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (first, _rx1) = connection(player);
        let first_id = first.connection_id;
        let (second, _rx2) = connection(player);

        registry.register(first);
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.connection_id, first_id);
        assert_eq!(registry.connection_count(), 1);

        // The replaced socket's disconnect must not purge the new binding.
        assert!(registry.unregister(first_id).is_none());
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn idle_connections_are_evicted() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (conn, _rx) = connection(player);
        registry.register(conn);
        registry.join_channels(player, &["global".into()]);

        let now = SystemTime::now();
        registry.touch_at(player, now - Duration::from_secs(11 * 60));

        let evicted = registry.evict_idle(Duration::from_secs(10 * 60), now);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].player_id, player);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.sender_for(player).is_none());
    }

    #[test]
    fn fresh_connections_survive_the_sweep() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (conn, _rx) = connection(player);
        registry.register(conn);

        let evicted = registry.evict_idle(Duration::from_secs(10 * 60), SystemTime::now());
        assert!(evicted.is_empty());
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn broadcast_skips_the_excluded_player() {
        let registry = ConnectionRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_conn, mut alice_rx) = connection(alice);
        let (bob_conn, mut bob_rx) = connection(bob);
        registry.register(alice_conn);
        registry.register(bob_conn);
        registry.join_channels(alice, &["global".into()]);
        registry.join_channels(bob, &["global".into()]);

        registry.broadcast("global", Message::Text("hello".into()), Some(alice));

        assert!(bob_rx.try_recv().is_ok());
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_many_deduplicates_members() {
        let registry = ConnectionRegistry::new();
        let player = Uuid::new_v4();
        let (conn, mut rx) = connection(player);
        registry.register(conn);
        let channels = vec!["global".to_owned(), "region:eu".to_owned()];
        registry.join_channels(player, &channels);

        registry.broadcast_many(&channels, Message::Text("once".into()), None);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
