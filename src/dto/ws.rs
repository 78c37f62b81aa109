use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{FinalStanding, GameMode, Region};

/// Messages accepted from live WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Handshake binding the connection to a player.
    Join {
        player_id: Uuid,
        /// Drives the `gamemode:*` channel memberships; no mode means no
        /// mode channels.
        #[serde(default)]
        game_mode: Option<GameMode>,
    },
    /// Durable score write, optionally mirrored into a session.
    ScoreUpdate {
        player_id: Uuid,
        score: u32,
        #[serde(default)]
        session_id: Option<Uuid>,
    },
    /// Online-flag toggle.
    StatusUpdate { player_id: Uuid, online: bool },
    /// Add the channel set derived from (region, game mode).
    Subscribe {
        #[serde(default)]
        region: Option<Region>,
        #[serde(default)]
        game_mode: Option<GameMode>,
    },
    /// Remove the channel set derived from (region, game mode).
    Unsubscribe {
        #[serde(default)]
        region: Option<Region>,
        #[serde(default)]
        game_mode: Option<GameMode>,
    },
    /// Enter a session's transport-level room.
    SessionJoin { session_id: Uuid },
    /// Leave a session's transport-level room.
    SessionLeave { session_id: Uuid },
    /// Liveness echo.
    Heartbeat,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Typed error frame emitted on the originating connection; the connection
/// itself stays open.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ErrorDetail {
    /// Machine-readable error kind, e.g. `rate-limited`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

/// Messages pushed to live WebSocket clients.
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Private acknowledgment after a successful join handshake.
    Joined {
        player_id: Uuid,
        name: String,
        score: u32,
        rank: u64,
        channels: Vec<String>,
    },
    /// Private confirmation of an applied score update.
    ScoreConfirmed {
        player_id: Uuid,
        score: u32,
        rank: u64,
    },
    /// Score change fanned out to the player's subscribed channels.
    LeaderboardScoreBroadcast {
        player_id: Uuid,
        name: String,
        score: u32,
        region: Region,
        #[serde(skip_serializing_if = "Option::is_none")]
        game_mode: Option<GameMode>,
    },
    /// A player's connection came online.
    Online { player_id: Uuid, name: String },
    /// A player's connection went away.
    Offline { player_id: Uuid, name: String },
    /// Explicit online-flag change.
    StatusChanged {
        player_id: Uuid,
        name: String,
        online: bool,
    },
    /// Score change scoped to one session's room.
    SessionScoreBroadcast {
        session_id: Uuid,
        player_id: Uuid,
        name: String,
        score: u32,
    },
    /// Final scoreboard pushed to a session's room.
    SessionEnded {
        session_id: Uuid,
        scoreboard: Vec<FinalStanding>,
    },
    /// Typed failure report for one inbound event.
    Error { error: ErrorDetail },
    /// Server-side timestamp echo.
    HeartbeatAck { server_time: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_message_parses() {
        let msg =
            ClientMessage::from_json_str(r#"{"type":"join","player_id":"2f1e9c5a-8d21-4f6b-9d9f-1c2b3a4d5e6f"}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Join { game_mode: None, .. }));
    }

    #[test]
    fn unknown_message_type_parses_to_unknown() {
        let msg = ClientMessage::from_json_str(r#"{"type":"teleport"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn error_frame_nests_type_and_message() {
        let frame = ServerMessage::Error {
            error: ErrorDetail {
                kind: "rate-limited",
                message: "retry in 12s".into(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "rate-limited");
    }
}
