//! # Leaderboard: score aggregation and ranked queries
//!
//! Accepts score submissions, keeps a durable per-player running total, and
//! answers two read queries through a generation-scoped cache:
//! - top N players by total score
//! - a single player's live total and rank
//!
//! ## Architecture
//!
//! ```text
//! submit ──► AggregationEngine ──► ScoreStore (one transaction)
//!                    │
//!                    └─► VersionedCache::bump_generation
//!
//! top_players / player_rank ──► QueryService ──► VersionedCache (hit)
//!                                     │
//!                                     └─► ScoreStore (miss) ──► ranking ──► cache put
//! ```
//!
//! ## Ranking
//!
//! Standard competition ranking (SQL `RANK()`) everywhere: equal totals share
//! a rank and the next distinct total is ranked `1 + count(strictly greater)`.
//!
//! ## Consistency
//!
//! Cache keys embed the generation. Every committed submission bumps it, so
//! entries computed before the commit become unreachable and age out by TTL.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod query;
pub mod ranking;
pub mod retry;
pub mod scheduler;
pub mod types;

pub use aggregation::AggregationEngine;
pub use cache::{CacheBackend, CacheStats, MokaCacheBackend, NoopCacheBackend, VersionedCache};
pub use config::LeaderboardConfig;
pub use db::{run_schema_migrations, CommitHook, ScoreStore, SqliteScoreStore};
pub use engine::Leaderboard;
pub use error::{LeaderboardError, StoreError, ValidationError};
pub use query::QueryService;
pub use ranking::compute_ranks;
pub use scheduler::rank_refresh_task;
pub use types::{
    Aggregate, GameMode, PlayerId, PlayerStanding, RankedEntry, ScoreEvent, ScoredPlayer,
    SubmitReceipt,
};
