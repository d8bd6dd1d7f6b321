//! Error taxonomy for the leaderboard engine
//!
//! - `ValidationError`: rejected before any store access, never retried
//! - `StoreError::PlayerNotFound`: terminal, never retried
//! - `StoreError::Transient`: retried with backoff, then surfaced as
//!   `SubmissionFailed` / `QueryFailed` with the last cause attached
//! - cache failures never reach this module (the cache degrades to a miss)

use super::types::PlayerId;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Input rejected before touching the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid score {0}: score must be non-negative")]
    NegativeScore(i64),

    #[error("invalid game mode '{0}': expected solo or team")]
    InvalidMode(String),

    #[error("invalid limit {0}: limit must be a positive integer")]
    InvalidLimit(i64),
}

/// Errors raised by a `ScoreStore` implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("constraint violation: {reason}")]
    Constraint {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("transient store error: {reason}")]
    Transient {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Deadline hit before the commit; the transaction was abandoned
    #[error("store call exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("store call abandoned by its caller, transaction rolled back")]
    Cancelled,

    #[error("schema error: {0}")]
    Schema(String),

    #[error("store worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    pub fn transient(reason: impl Into<String>) -> Self {
        StoreError::Transient {
            reason: reason.into(),
            source: None,
        }
    }

    /// Whether a retry could succeed without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }

    /// Whether a write may have committed even though the call failed
    ///
    /// Only a lost worker leaves the outcome unknown; a timed-out call is
    /// abandoned before commit and always rolls back.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, StoreError::Worker(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let reason = err.to_string();
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::Constraint {
                reason,
                source: Some(Box::new(err)),
            },
            _ => StoreError::Transient {
                reason,
                source: Some(Box::new(err)),
            },
        }
    }
}

/// Errors surfaced to callers of the leaderboard engine
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("score submission failed after {attempts} attempt(s): {source}")]
    SubmissionFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("query failed after {attempts} attempt(s): {source}")]
    QueryFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("rank refresh failed after {attempts} attempt(s): {source}")]
    RankRefreshFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl LeaderboardError {
    /// Stable machine-readable code for the transport layer
    pub fn code(&self) -> &'static str {
        match self {
            LeaderboardError::Validation(ValidationError::NegativeScore(_)) => "INVALID_SCORE",
            LeaderboardError::Validation(ValidationError::InvalidMode(_)) => "INVALID_MODE",
            LeaderboardError::Validation(ValidationError::InvalidLimit(_)) => "INVALID_LIMIT",
            LeaderboardError::PlayerNotFound(_) => "USER_NOT_FOUND",
            LeaderboardError::SubmissionFailed { .. } => "SUBMISSION_FAILED",
            LeaderboardError::QueryFailed { .. } => "QUERY_FAILED",
            LeaderboardError::RankRefreshFailed { .. } => "RANK_REFRESH_FAILED",
        }
    }
}
