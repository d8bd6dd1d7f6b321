//! Aggregation Engine - the write path
//!
//! ```text
//! submit(player, score, mode)
//!     ↓ validate (score >= 0)
//! ScoreStore::record_score   (exists check + event insert + upsert, one tx)
//!     ↓ commit hook: VersionedCache::bump_generation
//!     ↓ retried on transient errors with exponential backoff
//! SubmitReceipt
//! ```
//!
//! The generation is bumped by the store's commit hook, right after the
//! commit and before `submit` returns. The bump follows the commit even when
//! the caller drops `submit` mid-commit, and never happens for a rolled-back
//! attempt. So no query that starts after a commit can be served a payload
//! cached before it. Ranks are never recomputed here.

use super::cache::VersionedCache;
use super::db::{CommitHook, ScoreStore};
use super::error::{LeaderboardError, StoreError, ValidationError};
use super::retry::{retry_transient, ExponentialBackoff, RetryError};
use super::types::{GameMode, PlayerId, ScoreEvent, SubmitReceipt};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Accepts score submissions and maintains per-player aggregates
pub struct AggregationEngine {
    store: Arc<dyn ScoreStore>,
    cache: Arc<VersionedCache>,
    initial_backoff: Duration,
    max_attempts: u32,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AggregationEngine {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        cache: Arc<VersionedCache>,
        initial_backoff: Duration,
        max_attempts: u32,
    ) -> Self {
        Self::new_with_clock(
            store,
            cache,
            initial_backoff,
            max_attempts,
            Box::new(Utc::now),
        )
    }

    /// Create an engine with a custom clock
    ///
    /// Used for testing with deterministic timestamps.
    pub fn new_with_clock(
        store: Arc<dyn ScoreStore>,
        cache: Arc<VersionedCache>,
        initial_backoff: Duration,
        max_attempts: u32,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            store,
            cache,
            initial_backoff,
            max_attempts,
            now_fn,
        }
    }

    /// Submit one score for a player
    ///
    /// # Errors
    /// - `Validation(NegativeScore)` before any store access
    /// - `PlayerNotFound` if the player does not exist (not retried)
    /// - `SubmissionFailed` once transient failures exhaust the retry budget,
    ///   or on a terminal store error, carrying the last cause
    pub async fn submit(
        &self,
        player_id: PlayerId,
        score_delta: i64,
        mode: GameMode,
    ) -> Result<SubmitReceipt, LeaderboardError> {
        if score_delta < 0 {
            return Err(ValidationError::NegativeScore(score_delta).into());
        }

        let event = ScoreEvent::new(player_id, score_delta, mode, (self.now_fn)());
        let backoff = ExponentialBackoff::for_attempts(self.initial_backoff, self.max_attempts);

        let cache = self.cache.clone();
        let on_commit: CommitHook = Arc::new(move || {
            cache.bump_generation();
        });

        let result = retry_transient("record_score", backoff, || {
            self.store.record_score(event.clone(), on_commit.clone())
        })
        .await;

        match result {
            Ok(aggregate) => {
                log::debug!(
                    "✅ Player {} +{} ({}) → total {} (generation {})",
                    player_id,
                    score_delta,
                    mode,
                    aggregate.total_score,
                    self.cache.current_generation()
                );

                Ok(SubmitReceipt {
                    player_id,
                    score: score_delta,
                    total_score: aggregate.total_score,
                    committed_at: (self.now_fn)(),
                })
            }
            Err(RetryError {
                source: StoreError::PlayerNotFound(missing),
                ..
            }) => {
                log::debug!("Submission rejected: player {} not found", missing);
                Err(LeaderboardError::PlayerNotFound(missing))
            }
            Err(RetryError { attempts, source }) => {
                if source.outcome_unknown() {
                    let generation = self.cache.bump_generation();
                    log::warn!(
                        "⚠️  Submission outcome unknown for player {}, cache generation bumped to {}",
                        player_id,
                        generation
                    );
                }

                log::error!(
                    "❌ Submission for player {} failed after {} attempt(s): {}",
                    player_id,
                    attempts,
                    source
                );

                Err(LeaderboardError::SubmissionFailed { attempts, source })
            }
        }
    }
}
