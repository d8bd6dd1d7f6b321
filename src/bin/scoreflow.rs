//! scoreflow CLI - thin front end over the `Leaderboard` facade
//!
//! Usage:
//!   scoreflow migrate [--schema-dir sql] [--embedded]
//!   scoreflow submit <player> <score> <solo|team>
//!   scoreflow top [--limit N]
//!   scoreflow rank <player>
//!   scoreflow refresh-ranks [--watch]
//!
//! Results are printed to stdout as JSON; logs go to stderr.
//!
//! Environment variables (see `LeaderboardConfig::from_env`):
//!   SCOREFLOW_DB_PATH - SQLite database path (default: scoreflow.db)
//!   SCOREFLOW_SCHEMA_DIR - Schema directory for `migrate` (default: sql)
//!   CACHE_ENABLED - Use the in-memory cache (default: true)
//!   RANK_REFRESH_INTERVAL_MS - Interval for `refresh-ranks --watch`

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use scoreflow::leaderboard::{
    rank_refresh_task, run_schema_migrations, GameMode, Leaderboard, LeaderboardConfig,
    LeaderboardError, PlayerId, SqliteScoreStore,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Score aggregation and ranked-query engine")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update the database schema
    Migrate {
        /// Directory holding the .sql files (default: SCOREFLOW_SCHEMA_DIR)
        #[clap(long)]
        schema_dir: Option<String>,
        /// Use the schema compiled into the binary instead of a directory
        #[clap(long)]
        embedded: bool,
    },
    /// Record a score for a player
    Submit {
        player: i64,
        #[clap(allow_hyphen_values = true)]
        score: i64,
        /// Game mode: solo or team
        mode: String,
    },
    /// Show the top players
    Top {
        /// Number of entries (default: DEFAULT_TOP_LIMIT)
        #[clap(short, long, allow_hyphen_values = true)]
        limit: Option<i64>,
    },
    /// Show one player's total and rank
    Rank { player: i64 },
    /// Write the current ranks into the aggregates table
    RefreshRanks {
        /// Keep refreshing every RANK_REFRESH_INTERVAL_MS until Ctrl-C
        #[clap(long)]
        watch: bool,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = LeaderboardConfig::from_env();
    config.validate()?;

    match run(args.command, &config).await {
        Ok(()) => Ok(()),
        Err(CliError::Leaderboard(e)) => {
            error!("❌ {}", e);
            print_json(&ErrorBody {
                error: e.code(),
                message: e.to_string(),
            })?;
            Err(e.into())
        }
        Err(CliError::Other(e)) => Err(e),
    }
}

enum CliError {
    Leaderboard(LeaderboardError),
    Other(Box<dyn std::error::Error>),
}

impl From<LeaderboardError> for CliError {
    fn from(e: LeaderboardError) -> Self {
        CliError::Leaderboard(e)
    }
}

impl From<Box<dyn std::error::Error>> for CliError {
    fn from(e: Box<dyn std::error::Error>) -> Self {
        CliError::Other(e)
    }
}

async fn run(command: Command, config: &LeaderboardConfig) -> Result<(), CliError> {
    match command {
        Command::Migrate { schema_dir, embedded } => {
            let store = SqliteScoreStore::from_config(config);
            if embedded {
                info!("🔧 Applying embedded schema...");
                store
                    .initialize_schema()
                    .map_err(|e| CliError::Other(e.into()))?;
            } else {
                let schema_dir = schema_dir.unwrap_or_else(|| config.schema_dir.clone());
                let conn = store
                    .open_connection()
                    .map_err(|e| CliError::Other(e.into()))?;
                run_schema_migrations(&conn, &schema_dir).map_err(|e| CliError::Other(e.into()))?;
            }
            info!("✅ Database ready: {}", config.db_path);
        }

        Command::Submit { player, score, mode } => {
            let mode: GameMode = mode.parse().map_err(LeaderboardError::from)?;
            let leaderboard = Leaderboard::from_config(config);
            let receipt = leaderboard.submit(PlayerId(player), score, mode).await?;
            print_json(&receipt)?;
        }

        Command::Top { limit } => {
            let leaderboard = Leaderboard::from_config(config);
            let limit = limit.unwrap_or_else(|| leaderboard.default_top_limit());
            let entries = leaderboard.top_players(limit).await?;
            print_json(&entries)?;
        }

        Command::Rank { player } => {
            let leaderboard = Leaderboard::from_config(config);
            let standing = leaderboard.player_rank(PlayerId(player)).await?;
            print_json(&standing)?;
        }

        Command::RefreshRanks { watch } => {
            let leaderboard = Arc::new(Leaderboard::from_config(config));

            if !watch {
                let rows = leaderboard.refresh_stored_ranks().await?;
                print_json(&serde_json::json!({ "ranked": rows }))?;
                return Ok(());
            }

            if config.rank_refresh_interval_ms == 0 {
                return Err(CliError::Other(
                    "RANK_REFRESH_INTERVAL_MS must be positive for --watch".into(),
                ));
            }

            let task = tokio::spawn(rank_refresh_task(
                leaderboard.clone(),
                config.rank_refresh_interval_ms,
            ));

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| CliError::Other(e.into()))?;
            info!("🛑 Shutting down rank refresh");
            task.abort();
        }
    }

    Ok(())
}
