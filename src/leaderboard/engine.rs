//! Leaderboard facade
//!
//! Wires one `ScoreStore` and one `VersionedCache` into the write path
//! (`AggregationEngine`) and the read path (`QueryService`). This is the
//! surface a transport layer (HTTP handler, CLI) talks to.

use super::aggregation::AggregationEngine;
use super::cache::{CacheStats, VersionedCache};
use super::config::LeaderboardConfig;
use super::db::{ScoreStore, SqliteScoreStore};
use super::error::LeaderboardError;
use super::query::QueryService;
use super::retry::{retry_transient, ExponentialBackoff};
use super::types::{Aggregate, GameMode, PlayerId, PlayerStanding, RankedEntry, SubmitReceipt};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub struct Leaderboard {
    store: Arc<dyn ScoreStore>,
    cache: Arc<VersionedCache>,
    aggregation: AggregationEngine,
    queries: QueryService,
    initial_backoff: Duration,
    max_attempts: u32,
    default_top_limit: i64,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn ScoreStore>, cache: Arc<VersionedCache>, config: &LeaderboardConfig) -> Self {
        Self::new_with_clock(store, cache, config, Box::new(Utc::now))
    }

    /// Create a leaderboard whose submissions are stamped by `now_fn`
    pub fn new_with_clock(
        store: Arc<dyn ScoreStore>,
        cache: Arc<VersionedCache>,
        config: &LeaderboardConfig,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        let initial_backoff = config.initial_backoff();
        let max_attempts = config.max_attempts;

        Self {
            aggregation: AggregationEngine::new_with_clock(
                store.clone(),
                cache.clone(),
                initial_backoff,
                max_attempts,
                now_fn,
            ),
            queries: QueryService::new(store.clone(), cache.clone(), initial_backoff, max_attempts),
            store,
            cache,
            initial_backoff,
            max_attempts,
            default_top_limit: config.default_top_limit,
        }
    }

    /// SQLite store plus the cache backend selected by `CACHE_ENABLED`
    ///
    /// Does not create the schema.
    pub fn from_config(config: &LeaderboardConfig) -> Self {
        let store: Arc<dyn ScoreStore> = Arc::new(SqliteScoreStore::from_config(config));
        let cache = Arc::new(VersionedCache::from_config(config));

        log::info!("🏆 Leaderboard ready");
        log::info!("   ├─ Database: {}", config.db_path);
        log::info!("   ├─ Cache backend: {}", cache.backend_type());
        log::info!("   └─ Retry: {} attempts, {}ms initial backoff", config.max_attempts, config.initial_backoff_ms);

        Self::new(store, cache, config)
    }

    pub async fn submit(
        &self,
        player_id: PlayerId,
        score: i64,
        mode: GameMode,
    ) -> Result<SubmitReceipt, LeaderboardError> {
        self.aggregation.submit(player_id, score, mode).await
    }

    pub async fn top_players(&self, limit: i64) -> Result<Vec<RankedEntry>, LeaderboardError> {
        self.queries.top_players(limit).await
    }

    pub async fn player_rank(&self, player_id: PlayerId) -> Result<PlayerStanding, LeaderboardError> {
        self.queries.player_rank(player_id).await
    }

    /// Stored aggregate row, bypassing the cache
    ///
    /// `rank` here is the last snapshot written by `refresh_stored_ranks`,
    /// not the live rank.
    pub async fn stored_aggregate(&self, player_id: PlayerId) -> Result<Aggregate, LeaderboardError> {
        let backoff = ExponentialBackoff::for_attempts(self.initial_backoff, self.max_attempts);
        retry_transient("aggregate", backoff, || self.store.aggregate(player_id))
            .await
            .map_err(|e| LeaderboardError::QueryFailed {
                attempts: e.attempts,
                source: e.source,
            })?
            .ok_or(LeaderboardError::PlayerNotFound(player_id))
    }

    /// Recompute RANK() over all aggregates and persist it in `aggregates.rank`
    ///
    /// Totals are untouched, so the cache generation is not bumped.
    pub async fn refresh_stored_ranks(&self) -> Result<usize, LeaderboardError> {
        let backoff = ExponentialBackoff::for_attempts(self.initial_backoff, self.max_attempts);
        retry_transient("store_rank_snapshot", backoff, || self.store.store_rank_snapshot())
            .await
            .map_err(|e| LeaderboardError::RankRefreshFailed {
                attempts: e.attempts,
                source: e.source,
            })
    }

    pub fn default_top_limit(&self) -> i64 {
        self.default_top_limit
    }

    pub fn cache(&self) -> &VersionedCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
