//! Query Service - the read path
//!
//! `CheckCache → Hit: return | Miss: ReadStore → Compute → PopulateCache → return`
//!
//! Store errors (after bounded retries) surface as `QueryFailed`; a failed
//! query never returns stale or partial data.

use super::cache::{QueryShape, VersionedCache};
use super::db::ScoreStore;
use super::error::{LeaderboardError, StoreError, ValidationError};
use super::ranking::rank_by;
use super::retry::{retry_transient, ExponentialBackoff, RetryError};
use super::types::{PlayerId, PlayerStanding, RankedEntry};
use std::sync::Arc;
use std::time::Duration;

pub struct QueryService {
    store: Arc<dyn ScoreStore>,
    cache: Arc<VersionedCache>,
    initial_backoff: Duration,
    max_attempts: u32,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        cache: Arc<VersionedCache>,
        initial_backoff: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            cache,
            initial_backoff,
            max_attempts,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::for_attempts(self.initial_backoff, self.max_attempts)
    }

    /// Top `limit` players by total score, ranked with RANK() semantics
    ///
    /// Ranks over a prefix of the global ordering are exact: a player's rank
    /// depends only on strictly greater totals, which all sort before it.
    pub async fn top_players(&self, limit: i64) -> Result<Vec<RankedEntry>, LeaderboardError> {
        if limit <= 0 {
            return Err(ValidationError::InvalidLimit(limit).into());
        }

        let params = limit.to_string();
        let lookup = self.cache.get::<Vec<RankedEntry>>(QueryShape::Top, &params).await;
        if let Some(entries) = lookup.payload {
            return Ok(entries);
        }

        let fetch_limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let rows = retry_transient("top_aggregates", self.backoff(), || {
            self.store.top_aggregates(fetch_limit)
        })
        .await
        .map_err(query_failed)?;

        let entries: Vec<RankedEntry> = rank_by(rows, |row| row.total_score)
            .into_iter()
            .map(|(row, rank)| RankedEntry {
                player_id: row.player_id,
                username: row.username,
                total_score: row.total_score,
                rank,
            })
            .collect();

        // Scoped to the generation seen before the read
        self.cache
            .put(QueryShape::Top, &params, lookup.generation, &entries)
            .await;

        Ok(entries)
    }

    /// Live total and rank for one player
    ///
    /// # Errors
    /// `PlayerNotFound` when the player has no aggregate (never submitted).
    pub async fn player_rank(&self, player_id: PlayerId) -> Result<PlayerStanding, LeaderboardError> {
        let params = player_id.to_string();
        let lookup = self.cache.get::<PlayerStanding>(QueryShape::Rank, &params).await;
        if let Some(standing) = lookup.payload {
            return Ok(standing);
        }

        let standing = retry_transient("player_standing", self.backoff(), || {
            self.store.player_standing(player_id)
        })
        .await
        .map_err(query_failed)?
        .ok_or(LeaderboardError::PlayerNotFound(player_id))?;

        self.cache
            .put(QueryShape::Rank, &params, lookup.generation, &standing)
            .await;

        Ok(standing)
    }
}

fn query_failed(err: RetryError) -> LeaderboardError {
    match err.source {
        StoreError::PlayerNotFound(player_id) => LeaderboardError::PlayerNotFound(player_id),
        source => {
            log::error!(
                "❌ Query failed after {} attempt(s): {}",
                err.attempts,
                source
            );
            LeaderboardError::QueryFailed {
                attempts: err.attempts,
                source,
            }
        }
    }
}
