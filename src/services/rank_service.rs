//! Rank Query Engine.
//!
//! Every operation reads fresh from the score store; nothing here caches
//! ranks. Ordering is score descending with ties broken by most recent
//! activity, and a player's numeric rank follows the strictly-greater
//! policy: everyone tied on a score shares the same rank.

use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameMode, PlayerEntity, Region},
        score_store::{GroupKey, PlayerFilter, PlayerSort, ScoreStore},
    },
    dto::{
        common::Pagination,
        leaderboard::{
            AroundEntry, AroundResponse, BreakdownGroup, DistributionBucket, LeaderboardEntry,
            LeaderboardFilterQuery, LeaderboardPage, LeaderboardStats, RecentlyActiveEntry,
        },
        player::RankResponse,
    },
    error::ServiceError,
    services::player_service,
    state::SharedState,
};

const MAX_TOP_N: u64 = 100;
const MAX_PAGE_LIMIT: u64 = 100;
const MAX_AROUND_RANGE: u32 = 50;
const BREAKDOWN_TOP_SIZE: u64 = 3;

/// Regions eligible for per-region breakdowns. `Global` is not a real region
/// so it never gets a bucket of its own.
const BREAKDOWN_REGIONS: [Region; 5] =
    [Region::Na, Region::Eu, Region::Asia, Region::Sa, Region::Oce];

const BREAKDOWN_MODES: [GameMode; 5] = [
    GameMode::Casual,
    GameMode::Ranked,
    GameMode::Blitz,
    GameMode::Tournament,
    GameMode::Practice,
];

fn build_filter(query: LeaderboardFilterQuery) -> PlayerFilter {
    PlayerFilter::new(query.region, query.game_mode, query.online_only)
}

/// Top `n` players under the filter, ordered by score then recency.
pub async fn top_n(
    state: &SharedState,
    n: u64,
    query: LeaderboardFilterQuery,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    if !(1..=MAX_TOP_N).contains(&n) {
        return Err(ServiceError::InvalidInput(format!(
            "top-n size must be between 1 and {MAX_TOP_N}"
        )));
    }

    let store = state.require_score_store().await?;
    let players = store
        .find_players_sorted(build_filter(query), PlayerSort::ScoreDesc, 0, n)
        .await?;

    Ok(ranked_entries(players, 0))
}

/// One leaderboard page plus pagination metadata derived from the total
/// filtered count.
pub async fn page(
    state: &SharedState,
    limit: u64,
    offset: u64,
    query: LeaderboardFilterQuery,
) -> Result<LeaderboardPage, ServiceError> {
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ServiceError::InvalidInput(format!(
            "page limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }

    let store = state.require_score_store().await?;
    let filter = build_filter(query);
    let total = store.count_players(filter.clone()).await?;
    let players = store
        .find_players_sorted(filter, PlayerSort::ScoreDesc, offset, limit)
        .await?;

    Ok(LeaderboardPage {
        entries: ranked_entries(players, offset),
        pagination: Pagination::new(total, limit, offset),
    })
}

/// 1-based rank of one player under the filter.
pub async fn rank_of(
    state: &SharedState,
    player_id: Uuid,
    query: LeaderboardFilterQuery,
) -> Result<RankResponse, ServiceError> {
    let store = state.require_score_store().await?;
    let player = player_service::load_player(&store, player_id).await?;
    let filter = build_filter(query);
    let rank = rank_under_filter(&store, &player, filter.clone()).await?;

    Ok(RankResponse {
        player_id: player.id,
        name: player.name,
        rank,
        score: player.score,
        region: filter.region,
        game_mode: filter.game_mode,
    })
}

/// Contiguous rank window around one player, clipped at rank 1.
pub async fn around(
    state: &SharedState,
    player_id: Uuid,
    range: u32,
    query: LeaderboardFilterQuery,
) -> Result<AroundResponse, ServiceError> {
    if !(1..=MAX_AROUND_RANGE).contains(&range) {
        return Err(ServiceError::InvalidInput(format!(
            "around range must be between 1 and {MAX_AROUND_RANGE}"
        )));
    }

    let store = state.require_score_store().await?;
    let player = player_service::load_player(&store, player_id).await?;
    let filter = build_filter(query);
    let rank = rank_under_filter(&store, &player, filter.clone()).await?;

    let start_rank = rank.saturating_sub(u64::from(range)).max(1);
    let end_rank = rank + u64::from(range);
    let players = store
        .find_players_sorted(
            filter,
            PlayerSort::ScoreDesc,
            start_rank - 1,
            end_rank - start_rank + 1,
        )
        .await?;

    let entries = players
        .into_iter()
        .enumerate()
        .map(|(index, entity)| {
            let is_target = entity.id == player_id;
            AroundEntry {
                entry: LeaderboardEntry::from_ranked(start_rank + index as u64, entity),
                is_target,
            }
        })
        .collect();

    Ok(AroundResponse {
        player_id,
        rank,
        entries,
    })
}

/// Aggregate statistics plus region and game-mode distributions.
pub async fn stats(
    state: &SharedState,
    query: LeaderboardFilterQuery,
) -> Result<LeaderboardStats, ServiceError> {
    let store = state.require_score_store().await?;
    let filter = build_filter(query);

    let aggregates = store.score_aggregates(filter.clone()).await?;
    let by_region = store
        .aggregate_players(filter.clone(), GroupKey::Region)
        .await?;
    let by_game_mode = store.aggregate_players(filter, GroupKey::GameMode).await?;

    Ok(LeaderboardStats {
        total_players: aggregates.count,
        online_players: aggregates.online,
        average_score: round2(aggregates.average_score),
        min_score: aggregates.min_score,
        max_score: aggregates.max_score,
        by_region: distribution(by_region, aggregates.count),
        by_game_mode: distribution(by_game_mode, aggregates.count),
    })
}

/// Per-region leaderboard breakdown: player count and top slice per region.
pub async fn region_breakdown(
    state: &SharedState,
    query: LeaderboardFilterQuery,
) -> Result<Vec<BreakdownGroup>, ServiceError> {
    let mut groups = Vec::with_capacity(BREAKDOWN_REGIONS.len());
    for region in BREAKDOWN_REGIONS {
        let group_query = LeaderboardFilterQuery {
            region: Some(region),
            ..query
        };
        groups.push(breakdown_group(state, region.label().to_owned(), group_query).await?);
    }
    Ok(groups)
}

/// Per-game-mode leaderboard breakdown.
pub async fn game_mode_breakdown(
    state: &SharedState,
    query: LeaderboardFilterQuery,
) -> Result<Vec<BreakdownGroup>, ServiceError> {
    let mut groups = Vec::with_capacity(BREAKDOWN_MODES.len());
    for mode in BREAKDOWN_MODES {
        let group_query = LeaderboardFilterQuery {
            game_mode: Some(mode),
            ..query
        };
        groups.push(breakdown_group(state, mode.label().to_owned(), group_query).await?);
    }
    Ok(groups)
}

/// Players active inside the trailing recency window, most recent first,
/// each annotated with how long ago they were seen.
pub async fn recently_active(
    state: &SharedState,
    limit: u64,
    query: LeaderboardFilterQuery,
) -> Result<Vec<RecentlyActiveEntry>, ServiceError> {
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ServiceError::InvalidInput(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }

    let store = state.require_score_store().await?;
    let now = SystemTime::now();
    let cutoff = now - state.config().recent_window();
    let filter = build_filter(query).active_after(cutoff);

    let players = store
        .find_players_sorted(filter, PlayerSort::RecencyDesc, 0, limit)
        .await?;

    Ok(players
        .into_iter()
        .enumerate()
        .map(|(index, entity)| {
            let seconds_since_active = now
                .duration_since(entity.last_active)
                .unwrap_or_default()
                .as_secs();
            RecentlyActiveEntry {
                entry: LeaderboardEntry::from_ranked(index as u64 + 1, entity),
                seconds_since_active,
            }
        })
        .collect())
}

/// Strictly-greater rank: players above the target's score, plus one.
pub(crate) async fn rank_under_filter(
    store: &Arc<dyn ScoreStore>,
    player: &PlayerEntity,
    filter: PlayerFilter,
) -> Result<u64, ServiceError> {
    let above = store
        .count_players(filter.score_above(player.score))
        .await?;
    Ok(above + 1)
}

fn ranked_entries(players: Vec<PlayerEntity>, offset: u64) -> Vec<LeaderboardEntry> {
    players
        .into_iter()
        .enumerate()
        .map(|(index, entity)| LeaderboardEntry::from_ranked(offset + index as u64 + 1, entity))
        .collect()
}

async fn breakdown_group(
    state: &SharedState,
    label: String,
    query: LeaderboardFilterQuery,
) -> Result<BreakdownGroup, ServiceError> {
    let store = state.require_score_store().await?;
    let filter = build_filter(query);
    let player_count = store.count_players(filter.clone()).await?;
    let top = store
        .find_players_sorted(filter, PlayerSort::ScoreDesc, 0, BREAKDOWN_TOP_SIZE)
        .await?;

    Ok(BreakdownGroup {
        label,
        player_count,
        top: ranked_entries(top, 0),
    })
}

fn distribution(groups: Vec<(String, u64)>, total: u64) -> IndexMap<String, DistributionBucket> {
    groups
        .into_iter()
        .map(|(label, count)| {
            let percentage = if total == 0 {
                0.0
            } else {
                round2(count as f64 * 100.0 / total as f64)
            };
            (label, DistributionBucket { count, percentage })
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::score_store::memory::MemoryScoreStore,
        dto::player::{CreatePlayerRequest, ScoreUpdateRequest},
        services::player_service,
        state::AppState,
    };
    use std::time::Duration;

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_score_store(Arc::new(MemoryScoreStore::new()))
            .await;
        state
    }

    async fn seed_player(state: &SharedState, name: &str, region: Region, score: u32) -> Uuid {
        let created = player_service::create_player(
            state,
            CreatePlayerRequest {
                name: name.into(),
                region: Some(region),
                game_mode: Some(GameMode::Ranked),
            },
        )
        .await
        .unwrap();
        player_service::write_score(state, created.id, ScoreUpdateRequest { score })
            .await
            .unwrap();
        created.id
    }

    fn region_query(region: Region) -> LeaderboardFilterQuery {
        LeaderboardFilterQuery {
            region: Some(region),
            game_mode: None,
            online_only: false,
        }
    }

    #[tokio::test]
    async fn created_player_tops_its_region_after_score_update() {
        let state = test_state().await;
        let alice = seed_player(&state, "alice", Region::Na, 1500).await;
        seed_player(&state, "eve", Region::Eu, 9000).await;

        let top = top_n(&state, 1, region_query(Region::Na)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, alice);
        assert_eq!(top[0].score, 1500);
        assert_eq!(top[0].rank, 1);
    }

    #[tokio::test]
    async fn global_region_query_spans_all_regions() {
        let state = test_state().await;
        seed_player(&state, "alice", Region::Na, 1500).await;
        seed_player(&state, "eve", Region::Eu, 9000).await;

        let top = top_n(&state, 10, region_query(Region::Global)).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "eve");
    }

    #[tokio::test]
    async fn tied_players_share_a_rank() {
        let state = test_state().await;
        let first = seed_player(&state, "first", Region::Na, 1000).await;
        let second = seed_player(&state, "second", Region::Na, 1000).await;

        let query = region_query(Region::Na);
        assert_eq!(rank_of(&state, first, query).await.unwrap().rank, 1);
        assert_eq!(rank_of(&state, second, query).await.unwrap().rank, 1);
    }

    #[tokio::test]
    async fn rank_recomputes_after_each_write() {
        let state = test_state().await;
        let leader = seed_player(&state, "leader", Region::Na, 2000).await;
        let chaser = seed_player(&state, "chaser", Region::Na, 1000).await;

        let query = region_query(Region::Na);
        assert_eq!(rank_of(&state, chaser, query).await.unwrap().rank, 2);

        player_service::write_score(&state, chaser, ScoreUpdateRequest { score: 2500 })
            .await
            .unwrap();
        assert_eq!(rank_of(&state, chaser, query).await.unwrap().rank, 1);
        assert_eq!(rank_of(&state, leader, query).await.unwrap().rank, 2);
    }

    #[tokio::test]
    async fn around_window_is_contiguous_and_clipped_at_rank_one() {
        let state = test_state().await;
        let mut ids = Vec::new();
        for (index, name) in ["p1", "p2", "p3", "p4", "p5"].iter().enumerate() {
            let score = 5000 - (index as u32) * 100;
            ids.push(seed_player(&state, name, Region::Na, score).await);
        }

        // Target at rank 2 with range 3 clips the window to ranks 1..=5.
        let response = around(&state, ids[1], 3, region_query(Region::Na))
            .await
            .unwrap();
        assert_eq!(response.rank, 2);
        let ranks: Vec<u64> = response.entries.iter().map(|e| e.entry.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4, 5]);
        assert_eq!(
            response
                .entries
                .iter()
                .filter(|entry| entry.is_target)
                .count(),
            1
        );
        assert!(response.entries[1].is_target);
    }

    #[tokio::test]
    async fn top_n_bounds_are_enforced() {
        let state = test_state().await;
        assert!(matches!(
            top_n(&state, 0, LeaderboardFilterQuery::default()).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            top_n(&state, 101, LeaderboardFilterQuery::default()).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn pagination_metadata_reflects_totals() {
        let state = test_state().await;
        for i in 0..25 {
            seed_player(&state, &format!("p{i}"), Region::Na, 100 + i).await;
        }

        let result = page(&state, 10, 10, region_query(Region::Na)).await.unwrap();
        assert_eq!(result.entries.len(), 10);
        assert_eq!(result.entries[0].rank, 11);
        assert_eq!(result.pagination.total, 25);
        assert_eq!(result.pagination.current_page, 2);
        assert_eq!(result.pagination.total_pages, 3);
        assert!(result.pagination.has_next);
        assert!(result.pagination.has_previous);
    }

    #[tokio::test]
    async fn stats_percentages_cover_the_population() {
        let state = test_state().await;
        seed_player(&state, "na1", Region::Na, 100).await;
        seed_player(&state, "na2", Region::Na, 200).await;
        seed_player(&state, "eu1", Region::Eu, 300).await;
        seed_player(&state, "gl1", Region::Global, 400).await;

        let stats = stats(&state, LeaderboardFilterQuery::default())
            .await
            .unwrap();
        assert_eq!(stats.total_players, 4);
        assert_eq!(stats.max_score, 400);
        assert_eq!(stats.min_score, 100);
        assert_eq!(stats.by_region["NA"].count, 2);
        assert_eq!(stats.by_region["NA"].percentage, 50.0);
        assert_eq!(stats.by_region["GLOBAL"].count, 1);
    }

    #[tokio::test]
    async fn recently_active_sorts_by_recency_then_annotates() {
        let state = test_state().await;
        let fresh = seed_player(&state, "fresh", Region::Na, 100).await;
        let stale = seed_player(&state, "stale", Region::Na, 900).await;

        // Push one player outside the 5-minute window through the store.
        let store = state.require_score_store().await.unwrap();
        let mut entity = player_service::load_player(&store, stale).await.unwrap();
        entity.last_active = SystemTime::now() - Duration::from_secs(6 * 60);
        store.upsert_player(entity).await.unwrap();

        let recent = recently_active(&state, 10, LeaderboardFilterQuery::default())
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].entry.id, fresh);
        assert!(recent[0].seconds_since_active < 60);
    }

    #[tokio::test]
    async fn region_breakdown_has_no_global_bucket() {
        let state = test_state().await;
        seed_player(&state, "na1", Region::Na, 100).await;
        seed_player(&state, "gl1", Region::Global, 400).await;

        let groups = region_breakdown(&state, LeaderboardFilterQuery::default())
            .await
            .unwrap();
        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.label != "GLOBAL"));
        let na = groups.iter().find(|g| g.label == "NA").unwrap();
        assert_eq!(na.player_count, 1);
        assert_eq!(na.top.len(), 1);
    }
}
