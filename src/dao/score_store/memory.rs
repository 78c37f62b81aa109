//! In-process score store backend.
//!
//! Keeps every record in `DashMap`s with no durability. Fills the second
//! backend slot next to MongoDB and doubles as the unit-test harness for the
//! rank and session engines.

use std::cmp::Reverse;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{PlayerEntity, SessionEntity, SessionStatus};
use crate::dao::score_store::{
    GroupKey, PlayerFilter, PlayerSort, ScoreAggregates, ScoreStore,
};
use crate::dao::storage::StorageResult;

/// Volatile backend holding players and sessions in shared maps.
#[derive(Clone, Default)]
pub struct MemoryScoreStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    players: DashMap<Uuid, PlayerEntity>,
    names: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, SessionEntity>,
}

impl MemoryScoreStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_player_sync(&self, player: PlayerEntity) {
        if let Some(previous) = self.inner.players.get(&player.id) {
            if previous.name != player.name {
                self.inner.names.remove(&previous.name);
            }
        }
        self.inner.names.insert(player.name.clone(), player.id);
        self.inner.players.insert(player.id, player);
    }

    fn filtered_players(&self, filter: &PlayerFilter) -> Vec<PlayerEntity> {
        self.inner
            .players
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn sorted_slice(
        &self,
        filter: &PlayerFilter,
        sort: PlayerSort,
        skip: u64,
        limit: u64,
    ) -> Vec<PlayerEntity> {
        let mut players = self.filtered_players(filter);
        match sort {
            PlayerSort::ScoreDesc => {
                players.sort_by_key(|p| (Reverse(p.score), Reverse(p.last_active)));
            }
            PlayerSort::RecencyDesc => {
                players.sort_by_key(|p| (Reverse(p.last_active), Reverse(p.score)));
            }
        }
        players
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect()
    }

    fn aggregates(&self, filter: &PlayerFilter) -> ScoreAggregates {
        let players = self.filtered_players(filter);
        if players.is_empty() {
            return ScoreAggregates::default();
        }
        let count = players.len() as u64;
        let online = players.iter().filter(|p| p.online).count() as u64;
        let sum: u64 = players.iter().map(|p| u64::from(p.score)).sum();
        ScoreAggregates {
            count,
            online,
            average_score: sum as f64 / count as f64,
            min_score: players.iter().map(|p| p.score).min().unwrap_or(0),
            max_score: players.iter().map(|p| p.score).max().unwrap_or(0),
        }
    }

    fn group_counts(&self, filter: &PlayerFilter, group: GroupKey) -> Vec<(String, u64)> {
        let mut counts = indexmap::IndexMap::<&'static str, u64>::new();
        for player in self.filtered_players(filter) {
            let label = match group {
                GroupKey::Region => player.region.label(),
                GroupKey::GameMode => player.game_mode.label(),
            };
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(label, count)| (label.to_owned(), count))
            .collect()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn upsert_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.upsert_player_sync(player);
            Ok(())
        })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.players.get(&id).map(|e| e.value().clone())) })
    }

    fn find_player_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let id = store.inner.names.get(&name).map(|e| *e.value());
            Ok(id.and_then(|id| store.inner.players.get(&id).map(|e| e.value().clone())))
        })
    }

    fn count_players(&self, filter: PlayerFilter) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.filtered_players(&filter).len() as u64) })
    }

    fn find_players_sorted(
        &self,
        filter: PlayerFilter,
        sort: PlayerSort,
        skip: u64,
        limit: u64,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.sorted_slice(&filter, sort, skip, limit)) })
    }

    fn aggregate_players(
        &self,
        filter: PlayerFilter,
        group: GroupKey,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, u64)>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.group_counts(&filter, group)) })
    }

    fn score_aggregates(
        &self,
        filter: PlayerFilter,
    ) -> BoxFuture<'static, StorageResult<ScoreAggregates>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.aggregates(&filter)) })
    }

    fn save_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.sessions.get(&id).map(|e| e.value().clone())) })
    }

    fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut sessions: Vec<SessionEntity> = store
                .inner
                .sessions
                .iter()
                .filter(|entry| status.is_none_or(|s| entry.value().status == s))
                .map(|entry| entry.value().clone())
                .collect();
            sessions.sort_by_key(|s| s.created_at);
            Ok(sessions)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GameMode, Region};
    use std::time::{Duration, SystemTime};

    fn player(name: &str, score: u32, region: Region) -> PlayerEntity {
        let mut p = PlayerEntity::new(name.into(), region, GameMode::Ranked);
        p.score = score;
        p
    }

    #[tokio::test]
    async fn sorts_by_score_then_recency() {
        let store = MemoryScoreStore::new();
        let now = SystemTime::now();

        let mut older = player("older", 1000, Region::Na);
        older.last_active = now - Duration::from_secs(60);
        let mut newer = player("newer", 1000, Region::Na);
        newer.last_active = now;
        let top = player("top", 2000, Region::Na);

        for p in [older.clone(), newer.clone(), top.clone()] {
            store.upsert_player(p).await.unwrap();
        }

        let sorted = store
            .find_players_sorted(PlayerFilter::default(), PlayerSort::ScoreDesc, 0, 10)
            .await
            .unwrap();
        let names: Vec<&str> = sorted.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["top", "newer", "older"]);
    }

    #[tokio::test]
    async fn rename_releases_old_name() {
        let store = MemoryScoreStore::new();
        let mut p = player("before", 10, Region::Eu);
        store.upsert_player(p.clone()).await.unwrap();

        p.name = "after".into();
        store.upsert_player(p).await.unwrap();

        assert!(
            store
                .find_player_by_name("before".into())
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_player_by_name("after".into())
                .await
                .unwrap()
                .is_some()
        );
    }
}
