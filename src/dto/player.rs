use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{GameMode, PlayerEntity, Region},
    dto::{format_system_time, validation::validate_display_name},
};

/// Payload used to register a new player.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePlayerRequest {
    pub name: String,
    /// Defaults to `GLOBAL` when omitted.
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub game_mode: Option<GameMode>,
}

impl Validate for CreatePlayerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_display_name(&self.name) {
            errors.add("name", e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Partial update of player profile fields. Omitted fields are untouched.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePlayerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub game_mode: Option<GameMode>,
    #[serde(default)]
    pub online: Option<bool>,
}

impl Validate for UpdatePlayerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            if let Err(e) = validate_display_name(name) {
                errors.add("name", e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Absolute score write for a player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ScoreUpdateRequest {
    /// New current score; non-negative by construction.
    pub score: u32,
}

/// Outcome of a finished game from the player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
}

/// One finished game appended to a player's record.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GameResultRequest {
    pub outcome: GameOutcome,
    /// Score reached in that game, written as the new current score.
    pub score: u32,
}

/// Achievement snapshot carried in player views.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct AchievementView {
    pub name: String,
    pub unlocked_at: String,
}

/// Full player view returned by the player endpoints.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PlayerResponse {
    pub id: Uuid,
    pub name: String,
    pub region: Region,
    pub game_mode: GameMode,
    pub score: u32,
    pub games_played: u32,
    pub average_score: u32,
    pub best_score: u32,
    pub online: bool,
    pub last_active: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub achievements: Vec<AchievementView>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PlayerEntity> for PlayerResponse {
    fn from(entity: PlayerEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            region: entity.region,
            game_mode: entity.game_mode,
            score: entity.score,
            games_played: entity.games_played,
            average_score: entity.average_score,
            best_score: entity.best_score,
            online: entity.online,
            last_active: format_system_time(entity.last_active),
            wins: entity.wins,
            losses: entity.losses,
            draws: entity.draws,
            achievements: entity
                .achievements
                .into_iter()
                .map(|a| AchievementView {
                    name: a.name,
                    unlocked_at: format_system_time(a.unlocked_at),
                })
                .collect(),
            created_at: format_system_time(entity.created_at),
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

/// Rank lookup result for a single player under a filter.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct RankResponse {
    pub player_id: Uuid,
    pub name: String,
    /// 1-based rank; players tied on score share the same rank.
    pub rank: u64,
    pub score: u32,
    pub region: Option<Region>,
    pub game_mode: Option<GameMode>,
}

/// Derived statistics view for one player.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerStatsResponse {
    pub player_id: Uuid,
    pub name: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Wins over games played, zero when no game was recorded.
    pub win_rate: f64,
    pub score: u32,
    pub average_score: u32,
    pub best_score: u32,
    pub achievements: Vec<AchievementView>,
}

impl From<PlayerEntity> for PlayerStatsResponse {
    fn from(entity: PlayerEntity) -> Self {
        let win_rate = if entity.games_played == 0 {
            0.0
        } else {
            f64::from(entity.wins) / f64::from(entity.games_played)
        };
        Self {
            player_id: entity.id,
            name: entity.name.clone(),
            games_played: entity.games_played,
            wins: entity.wins,
            losses: entity.losses,
            draws: entity.draws,
            win_rate,
            score: entity.score,
            average_score: entity.average_score,
            best_score: entity.best_score,
            achievements: entity
                .achievements
                .into_iter()
                .map(|a| AchievementView {
                    name: a.name,
                    unlocked_at: format_system_time(a.unlocked_at),
                })
                .collect(),
        }
    }
}
