//! Core data types for the leaderboard engine
//!
//! Table mapping (see `/sql/`):
//! - `score_events` → `ScoreEvent`
//! - `aggregates` → `Aggregate`
//!
//! `RankedEntry` and `PlayerStanding` are derived query results; they are
//! what the versioned cache stores, so both round-trip through serde.

use super::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque player identifier, owned by the account service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

impl PlayerId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PlayerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Game mode a score was earned in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Solo,
    Team,
}

impl GameMode {
    /// Value stored in `score_events.mode`
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Team => "team",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "solo" => Ok(GameMode::Solo),
            "team" => Ok(GameMode::Team),
            _ => Err(ValidationError::InvalidMode(s.to_string())),
        }
    }
}

/// A single committed score submission (immutable)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEvent {
    pub player_id: PlayerId,
    pub score_delta: i64,
    pub mode: GameMode,
    pub occurred_at: DateTime<Utc>,
}

impl ScoreEvent {
    pub fn new(player_id: PlayerId, score_delta: i64, mode: GameMode, occurred_at: DateTime<Utc>) -> Self {
        Self {
            player_id,
            score_delta,
            mode,
            occurred_at,
        }
    }
}

/// Per-player running total
///
/// `rank` is the last stored snapshot and may be `None` or stale; live ranks
/// come from the query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub player_id: PlayerId,
    pub total_score: i64,
    pub rank: Option<i64>,
}

/// Aggregate row joined with the player's display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPlayer {
    pub player_id: PlayerId,
    pub username: Option<String>,
    pub total_score: i64,
}

/// One row of a top-N result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub total_score: i64,
    pub rank: u64,
}

/// A single player's live total and rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub player_id: PlayerId,
    pub total_score: i64,
    pub rank: u64,
}

/// Returned to the caller after a committed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub player_id: PlayerId,
    pub score: i64,
    pub total_score: i64,
    pub committed_at: DateTime<Utc>,
}
