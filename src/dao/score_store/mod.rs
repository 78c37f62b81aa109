pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameMode, PlayerEntity, Region, SessionEntity, SessionStatus,
};
use crate::dao::storage::StorageResult;

/// Conjunction of constraints applied to leaderboard queries.
///
/// A `Global` region restriction is meaningless (it would match everyone), so
/// the constructor erases it; backends never see `region == Some(Global)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerFilter {
    pub region: Option<Region>,
    pub game_mode: Option<GameMode>,
    pub online_only: bool,
    pub active_after: Option<SystemTime>,
    pub score_above: Option<u32>,
}

impl PlayerFilter {
    /// Build a filter from the caller-facing knobs, normalizing `Global`
    /// away.
    pub fn new(region: Option<Region>, game_mode: Option<GameMode>, online_only: bool) -> Self {
        Self {
            region: region.filter(|r| *r != Region::Global),
            game_mode,
            online_only,
            active_after: None,
            score_above: None,
        }
    }

    /// Restrict to players active after the given instant.
    pub fn active_after(mut self, after: SystemTime) -> Self {
        self.active_after = Some(after);
        self
    }

    /// Restrict to players with a score strictly greater than `score`.
    pub fn score_above(mut self, score: u32) -> Self {
        self.score_above = Some(score);
        self
    }

    /// Whether a player record satisfies every constraint.
    pub fn matches(&self, player: &PlayerEntity) -> bool {
        if let Some(region) = self.region {
            if player.region != region {
                return false;
            }
        }
        if let Some(mode) = self.game_mode {
            if player.game_mode != mode {
                return false;
            }
        }
        if self.online_only && !player.online {
            return false;
        }
        if let Some(after) = self.active_after {
            if player.last_active <= after {
                return false;
            }
        }
        if let Some(score) = self.score_above {
            if player.score <= score {
                return false;
            }
        }
        true
    }
}

/// Sort orders a backend must support for leaderboard slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSort {
    /// Score descending, ties broken by most recent activity.
    ScoreDesc,
    /// Most recent activity first, ties broken by score descending.
    RecencyDesc,
}

/// Grouping dimension for distribution aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Region,
    GameMode,
}

/// Numeric aggregates over a filtered player population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreAggregates {
    pub count: u64,
    pub online: u64,
    pub average_score: f64,
    pub min_score: u32,
    pub max_score: u32,
}

/// Abstraction over the persistence layer for players and sessions.
///
/// Correctness is the only hard contract; backends are expected (but not
/// required) to index `(region, game_mode, score desc)` so rank queries do
/// not degrade to full scans.
pub trait ScoreStore: Send + Sync {
    fn upsert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn find_player_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn count_players(&self, filter: PlayerFilter) -> BoxFuture<'static, StorageResult<u64>>;
    fn find_players_sorted(
        &self,
        filter: PlayerFilter,
        sort: PlayerSort,
        skip: u64,
        limit: u64,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    fn aggregate_players(
        &self,
        filter: PlayerFilter,
        group: GroupKey,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, u64)>>>;
    fn score_aggregates(
        &self,
        filter: PlayerFilter,
    ) -> BoxFuture<'static, StorageResult<ScoreAggregates>>;
    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_region_filter_is_erased() {
        let filter = PlayerFilter::new(Some(Region::Global), None, false);
        assert_eq!(filter.region, None);

        // A GLOBAL-tagged player is still matched by a concrete-region miss
        // only when regions differ.
        let mut player = PlayerEntity::new("p".into(), Region::Global, GameMode::Casual);
        assert!(filter.matches(&player));

        let eu = PlayerFilter::new(Some(Region::Eu), None, false);
        assert!(!eu.matches(&player));
        player.region = Region::Eu;
        assert!(eu.matches(&player));
    }

    #[test]
    fn score_above_is_strictly_greater() {
        let mut player = PlayerEntity::new("p".into(), Region::Na, GameMode::Casual);
        player.score = 1000;
        let filter = PlayerFilter::default().score_above(1000);
        assert!(!filter.matches(&player));
        player.score = 1001;
        assert!(filter.matches(&player));
    }
}
