use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{GameMode, PlayerEntity, Region},
    dto::{common::Pagination, format_system_time},
};

/// Filter knobs shared by every leaderboard query.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct LeaderboardFilterQuery {
    /// Restrict to one region; `GLOBAL` means no restriction.
    pub region: Option<Region>,
    /// Restrict to one game mode.
    pub game_mode: Option<GameMode>,
    /// Only players with a live connection.
    #[serde(default)]
    pub online_only: bool,
}

/// Query parameters for the paginated leaderboard.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaderboardPageQuery {
    /// Page size, 1-100.
    pub limit: Option<u64>,
    /// Number of leading entries to skip.
    pub offset: Option<u64>,
    pub region: Option<Region>,
    pub game_mode: Option<GameMode>,
    #[serde(default)]
    pub online_only: bool,
}

impl LeaderboardPageQuery {
    /// Split into the window and the shared filter knobs.
    pub fn into_parts(self) -> (u64, u64, LeaderboardFilterQuery) {
        (
            self.limit.unwrap_or(10),
            self.offset.unwrap_or(0),
            LeaderboardFilterQuery {
                region: self.region,
                game_mode: self.game_mode,
                online_only: self.online_only,
            },
        )
    }
}

impl Validate for LeaderboardPageQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(limit) = self.limit {
            if !(1..=100).contains(&limit) {
                let mut err = ValidationError::new("limit_range");
                err.message = Some("limit must be between 1 and 100".into());
                errors.add("limit", err);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Query parameters for the around-player window.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AroundQuery {
    /// Ranks above and below the target to include, 1-50.
    pub range: Option<u32>,
    pub region: Option<Region>,
    pub game_mode: Option<GameMode>,
    #[serde(default)]
    pub online_only: bool,
}

/// Query parameters for the recently-active listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct RecentQuery {
    /// Maximum entries to return, 1-100.
    pub limit: Option<u64>,
    pub region: Option<Region>,
    pub game_mode: Option<GameMode>,
}

/// One row of a leaderboard slice.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct LeaderboardEntry {
    /// 1-based position within the queried slice.
    pub rank: u64,
    pub id: Uuid,
    pub name: String,
    pub region: Region,
    pub game_mode: GameMode,
    pub score: u32,
    pub online: bool,
    pub last_active: String,
}

impl LeaderboardEntry {
    /// Build an entry from a player and its position in the slice.
    pub fn from_ranked(rank: u64, entity: PlayerEntity) -> Self {
        Self {
            rank,
            id: entity.id,
            name: entity.name,
            region: entity.region,
            game_mode: entity.game_mode,
            score: entity.score,
            online: entity.online,
            last_active: format_system_time(entity.last_active),
        }
    }
}

/// Paginated leaderboard slice.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub pagination: Pagination,
}

/// Entry of an around-player window, flagging the target row.
#[derive(Debug, Serialize, ToSchema)]
pub struct AroundEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub is_target: bool,
}

/// Around-player window response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AroundResponse {
    pub player_id: Uuid,
    /// The target's own rank under the filter.
    pub rank: u64,
    pub entries: Vec<AroundEntry>,
}

/// Share of the filtered population falling into one group.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct DistributionBucket {
    pub count: u64,
    /// Percentage of the filtered total, rounded to two decimals.
    pub percentage: f64,
}

/// Aggregate statistics over a filtered leaderboard population.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardStats {
    pub total_players: u64,
    pub online_players: u64,
    pub average_score: f64,
    pub min_score: u32,
    pub max_score: u32,
    pub by_region: IndexMap<String, DistributionBucket>,
    pub by_game_mode: IndexMap<String, DistributionBucket>,
}

/// Top slice of one region or game-mode group.
#[derive(Debug, Serialize, ToSchema)]
pub struct BreakdownGroup {
    pub label: String,
    pub player_count: u64,
    pub top: Vec<LeaderboardEntry>,
}

/// Recently-active row annotated with its staleness.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecentlyActiveEntry {
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
    pub seconds_since_active: u64,
}
