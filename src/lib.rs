//! scoreflow - score aggregation and ranked-query engine
//!
//! See [`leaderboard`] for the engine and `src/bin/scoreflow.rs` for the CLI.

pub mod leaderboard;
pub mod sqlite_pragma;
