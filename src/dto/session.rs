use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{
        Difficulty, GameMode, ParticipantEntity, Region, SessionEntity, SessionEventEntity,
        SessionEventKind, SessionSettings, SessionStatus,
    },
    dto::format_system_time,
};

/// Match rules supplied when creating a session.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SessionSettingsInput {
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    #[serde(default)]
    pub score_limit: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl From<SessionSettingsInput> for SessionSettings {
    fn from(value: SessionSettingsInput) -> Self {
        Self {
            time_limit_secs: value.time_limit_secs,
            score_limit: value.score_limit,
            difficulty: value.difficulty.unwrap_or_default(),
        }
    }
}

/// Payload used to open a new session in the waiting state.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub game_mode: GameMode,
    /// Defaults to `GLOBAL` when omitted.
    #[serde(default)]
    pub region: Option<Region>,
    /// Participant capacity, 2-64. Defaults to 4.
    #[serde(default)]
    pub max_players: Option<u32>,
    #[serde(default)]
    pub settings: Option<SessionSettingsInput>,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(max_players) = self.max_players {
            if !(2..=64).contains(&max_players) {
                let mut err = ValidationError::new("max_players_range");
                err.message = Some("max_players must be between 2 and 64".into());
                errors.add("max_players", err);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Player joining a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    pub player_id: Uuid,
}

/// Player leaving a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LeaveSessionRequest {
    pub player_id: Uuid,
}

/// In-session score write. The score replaces the participant's current
/// in-session score; `delta` and `reason` are recorded in the event log only.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SessionScoreRequest {
    pub player_id: Uuid,
    pub score: u32,
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Participant view inside a session response.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ParticipantView {
    pub player_id: Uuid,
    pub name: String,
    pub score_at_join: u32,
    pub score: u32,
    pub final_position: Option<u32>,
    pub active: bool,
}

impl From<ParticipantEntity> for ParticipantView {
    fn from(entity: ParticipantEntity) -> Self {
        Self {
            player_id: entity.player_id,
            name: entity.name,
            score_at_join: entity.score_at_join,
            score: entity.score,
            final_position: entity.final_position,
            active: entity.active,
        }
    }
}

/// Session view returned by the session endpoints.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub status: SessionStatus,
    pub game_mode: GameMode,
    pub region: Region,
    pub max_players: u32,
    pub participants: Vec<ParticipantView>,
    pub time_limit_secs: Option<u32>,
    pub score_limit: Option<u32>,
    pub difficulty: Difficulty,
    pub event_count: usize,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_secs: Option<u64>,
}

impl From<SessionEntity> for SessionResponse {
    fn from(entity: SessionEntity) -> Self {
        Self {
            id: entity.id,
            status: entity.status,
            game_mode: entity.game_mode,
            region: entity.region,
            max_players: entity.max_players,
            participants: entity.participants.into_iter().map(Into::into).collect(),
            time_limit_secs: entity.settings.time_limit_secs,
            score_limit: entity.settings.score_limit,
            difficulty: entity.settings.difficulty,
            event_count: entity.events.len(),
            created_at: format_system_time(entity.created_at),
            started_at: entity.started_at.map(format_system_time),
            ended_at: entity.ended_at.map(format_system_time),
            duration_secs: entity.duration_secs,
        }
    }
}

/// One event-log entry with a formatted timestamp.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEventView {
    pub at: String,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

impl From<SessionEventEntity> for SessionEventView {
    fn from(entity: SessionEventEntity) -> Self {
        Self {
            at: format_system_time(entity.at),
            kind: entity.kind,
        }
    }
}

/// Aggregate statistics over every stored session.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStats {
    pub total: u64,
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub abandoned: u64,
    /// Mean duration of completed sessions, absent when none completed.
    pub average_duration_secs: Option<f64>,
    pub by_game_mode: IndexMap<String, u64>,
}
