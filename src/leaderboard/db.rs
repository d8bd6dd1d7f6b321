//! Durable store for score events and per-player aggregates
//!
//! Tables (see `/sql/`):
//! - `players` - owned by the account service, read-only here
//! - `score_events` - INSERT only (one row per committed submission)
//! - `aggregates` - UPSERT on player_id (`total_score += delta`)
//!
//! Every call opens its own connection inside a blocking task, so readers
//! never queue behind a shared handle and SQLite's WAL locking is the only
//! serialization point between writers.
//!
//! ## Deadlines and cancellation
//!
//! Each call runs under a deadline. A `CommitGate` shared between the caller
//! and the worker decides exactly once whether a write commits or is
//! abandoned:
//! - the worker claims the gate right before `COMMIT`
//! - a caller that hits its deadline (or drops the future) claims it first,
//!   interrupts the running statement and walks away; the worker then rolls
//!   back whenever it gets there
//! - a caller that loses the race waits for the commit that is already under
//!   way and reports its real outcome
//!
//! So `StoreError::Timeout` always means nothing was written.

use super::config::LeaderboardConfig;
use super::error::StoreError;
use super::ranking::compute_ranks;
use super::types::{Aggregate, PlayerId, PlayerStanding, ScoreEvent, ScoredPlayer};
use crate::sqlite_pragma::{open_tuned_connection, DEFAULT_BUSY_TIMEOUT};
use async_trait::async_trait;
use rusqlite::{
    params, Connection, InterruptHandle, OptionalExtension, Transaction, TransactionBehavior,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Schema shipped with the crate, in execution order (sorted by file name,
/// the same order `run_schema_migrations` uses for a directory)
const EMBEDDED_SCHEMA: &[(&str, &str)] = &[
    ("00_players.sql", include_str!("../../sql/00_players.sql")),
    ("01_score_events.sql", include_str!("../../sql/01_score_events.sql")),
    ("02_aggregates.sql", include_str!("../../sql/02_aggregates.sql")),
];

/// Callback run once a submission's transaction has committed
pub type CommitHook = Arc<dyn Fn() + Send + Sync>;

/// Transactional contract the engine needs from a durable store
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Record one submission atomically
    ///
    /// In a single transaction:
    /// 1. verify the player exists (`StoreError::PlayerNotFound` otherwise)
    /// 2. insert the score event
    /// 3. upsert the aggregate (`total_score += score_delta`)
    ///
    /// `on_commit` runs exactly once if and only if the transaction commits,
    /// after the commit and before the call resolves. It still runs when the
    /// caller dropped the future while the commit was under way.
    ///
    /// Returns the aggregate as committed.
    async fn record_score(&self, event: ScoreEvent, on_commit: CommitHook) -> Result<Aggregate, StoreError>;

    /// Stored aggregate for one player, including the last rank snapshot
    async fn aggregate(&self, player_id: PlayerId) -> Result<Option<Aggregate>, StoreError>;

    /// Aggregates ordered by total descending, at most `limit` rows
    async fn top_aggregates(&self, limit: usize) -> Result<Vec<ScoredPlayer>, StoreError>;

    /// Live total and rank for one player (`None` if no aggregate exists)
    ///
    /// Rank is `1 + count(players with strictly greater total)`, computed
    /// without materializing the ranking.
    async fn player_standing(&self, player_id: PlayerId) -> Result<Option<PlayerStanding>, StoreError>;

    /// Recompute every player's rank and store it in `aggregates.rank`
    ///
    /// Returns the number of rows written.
    async fn store_rank_snapshot(&self) -> Result<usize, StoreError>;
}

/// Run schema migrations from a directory of `.sql` files
///
/// Files run in file-name order (`00_`, `01_`, ...) and must be idempotent
/// (`IF NOT EXISTS`). Returns the number of files applied.
pub fn run_schema_migrations(conn: &Connection, schema_dir: impl AsRef<Path>) -> Result<usize, StoreError> {
    let schema_dir = schema_dir.as_ref();
    let unreadable = |e: std::io::Error| {
        StoreError::Schema(format!("cannot read {}: {}", schema_dir.display(), e))
    };

    if !schema_dir.is_dir() {
        return Err(StoreError::Schema(format!(
            "schema directory not found: {}",
            schema_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(schema_dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sql = fs::read_to_string(&path).map_err(unreadable)?;
        files.push((name, sql));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    log::info!("🔧 Running schema migrations from: {}", schema_dir.display());
    apply_schema(conn, files.iter().map(|(name, sql)| (name.as_str(), sql.as_str())))
}

fn apply_schema<'a>(
    conn: &Connection,
    files: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<usize, StoreError> {
    let mut applied = 0;
    for (name, sql) in files {
        conn.execute_batch(sql)
            .map_err(|e| StoreError::Schema(format!("{}: {}", name, e)))?;
        log::info!("   ├─ Applied: {}", name);
        applied += 1;
    }
    log::info!("   └─ ✅ {} schema file(s) applied", applied);
    Ok(applied)
}

/// SQLite implementation of `ScoreStore`
pub struct SqliteScoreStore {
    db_path: PathBuf,
    busy_timeout: Duration,
    call_timeout: Duration,
}

impl SqliteScoreStore {
    /// Create a store over an existing database file
    ///
    /// Does NOT create the schema; call `initialize_schema` or
    /// `run_schema_migrations` first.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            call_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &LeaderboardConfig) -> Self {
        Self::new(&config.db_path)
            .with_busy_timeout(config.busy_timeout())
            .with_call_timeout(config.store_timeout())
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a tuned connection to the store's database
    pub fn open_connection(&self) -> Result<Connection, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::transient(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(open_tuned_connection(&self.db_path, self.busy_timeout)?)
    }

    /// Create tables from the schema embedded in the binary (idempotent)
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.open_connection()?;
        log::info!("🔧 Applying embedded schema to {}", self.db_path.display());
        apply_schema(&conn, EMBEDDED_SCHEMA.iter().copied())?;
        Ok(())
    }

    /// Run `f` on a fresh connection in a blocking task, under the call deadline
    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &CommitGate) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        let gate = Arc::new(CommitGate::default());
        let (handle_tx, handle_rx) = oneshot::channel::<InterruptHandle>();

        let worker_gate = gate.clone();
        let mut task = tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = open_tuned_connection(&db_path, busy_timeout)?;
            let _ = handle_tx.send(conn.get_interrupt_handle());

            // Checked after the handle is published so an abandoning caller
            // either reaches the handle or we see the gate closed
            if worker_gate.is_abandoned() {
                return Err(StoreError::Cancelled);
            }

            f(&mut conn, &worker_gate)
        });

        let mut guard = AbandonGuard {
            gate,
            interrupt: handle_rx,
            armed: true,
        };

        let waited = tokio::time::timeout(self.call_timeout, &mut task).await;
        let joined = match waited {
            Ok(joined) => joined,
            Err(_) => {
                if guard.abandon() {
                    log::warn!(
                        "⏱️  Store call '{}' exceeded {}ms deadline, abandoned",
                        operation,
                        self.call_timeout.as_millis()
                    );
                    return Err(StoreError::Timeout(self.call_timeout));
                }

                // Worker already claimed the commit; its result is final
                log::debug!("Store call '{}' hit its deadline mid-commit, waiting", operation);
                task.await
            }
        };

        guard.disarm();
        joined.map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

const GATE_OPEN: u8 = 0;
const GATE_COMMITTING: u8 = 1;
const GATE_ABANDONED: u8 = 2;

/// One-shot decision between "worker commits" and "caller abandons"
#[derive(Debug, Default)]
struct CommitGate {
    state: AtomicU8,
}

impl CommitGate {
    /// Claim the commit; false once the caller has abandoned the call
    fn begin_commit(&self) -> bool {
        self.state
            .compare_exchange(GATE_OPEN, GATE_COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claim the abandon; false once the worker is committing
    fn abandon(&self) -> bool {
        self.state
            .compare_exchange(GATE_OPEN, GATE_ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::SeqCst) == GATE_ABANDONED
    }
}

/// Commit `tx` unless the caller abandoned the call, else roll it back
fn commit_unless_abandoned(tx: Transaction<'_>, gate: &CommitGate) -> Result<(), StoreError> {
    if !gate.begin_commit() {
        tx.rollback()?;
        return Err(StoreError::Cancelled);
    }
    tx.commit()?;
    Ok(())
}

/// Abandons the in-flight call if the caller stops waiting
///
/// Covers both the deadline path and a caller dropping the future.
struct AbandonGuard {
    gate: Arc<CommitGate>,
    interrupt: oneshot::Receiver<InterruptHandle>,
    armed: bool,
}

impl AbandonGuard {
    /// True if the call was abandoned before the worker could commit
    fn abandon(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;

        if !self.gate.abandon() {
            return false;
        }
        if let Ok(handle) = self.interrupt.try_recv() {
            handle.interrupt();
        }
        true
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.abandon() {
            log::debug!("Store call dropped by caller, abandoned");
        }
    }
}

fn player_exists(conn: &Connection, player_id: PlayerId) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM players WHERE id = ?1)",
        [player_id.value()],
        |row| row.get(0),
    )
}

fn record_score_tx(
    conn: &mut Connection,
    gate: &CommitGate,
    event: &ScoreEvent,
    on_commit: &(dyn Fn() + Send + Sync),
) -> Result<Aggregate, StoreError> {
    // IMMEDIATE takes the write lock up front, so two submissions for the
    // same player serialize here instead of failing at upgrade time
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !player_exists(&tx, event.player_id)? {
        // Dropping tx rolls back
        return Err(StoreError::PlayerNotFound(event.player_id));
    }

    tx.execute(
        "INSERT INTO score_events (player_id, score_delta, mode, occurred_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.player_id.value(),
            event.score_delta,
            event.mode.as_str(),
            event.occurred_at.timestamp_millis(),
        ],
    )?;

    let aggregate = tx.query_row(
        r#"
        INSERT INTO aggregates (player_id, total_score, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(player_id) DO UPDATE SET
            total_score = aggregates.total_score + excluded.total_score,
            updated_at = excluded.updated_at
        RETURNING player_id, total_score, rank
        "#,
        params![
            event.player_id.value(),
            event.score_delta,
            event.occurred_at.timestamp_millis(),
        ],
        |row| {
            Ok(Aggregate {
                player_id: PlayerId(row.get(0)?),
                total_score: row.get(1)?,
                rank: row.get(2)?,
            })
        },
    )?;

    commit_unless_abandoned(tx, gate)?;
    on_commit();

    Ok(aggregate)
}

fn fetch_aggregate(conn: &Connection, player_id: PlayerId) -> Result<Option<Aggregate>, rusqlite::Error> {
    conn.query_row(
        "SELECT player_id, total_score, rank FROM aggregates WHERE player_id = ?1",
        [player_id.value()],
        |row| {
            Ok(Aggregate {
                player_id: PlayerId(row.get(0)?),
                total_score: row.get(1)?,
                rank: row.get(2)?,
            })
        },
    )
    .optional()
}

fn fetch_top(conn: &Connection, limit: usize) -> Result<Vec<ScoredPlayer>, rusqlite::Error> {
    // player_id as secondary key keeps tied rows in a deterministic order,
    // so repeated computations for one generation produce identical payloads
    let mut stmt = conn.prepare(
        "SELECT a.player_id, p.username, a.total_score
         FROM aggregates a
         LEFT JOIN players p ON p.id = a.player_id
         ORDER BY a.total_score DESC, a.player_id ASC
         LIMIT ?1",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map([limit], |row| {
            Ok(ScoredPlayer {
                player_id: PlayerId(row.get(0)?),
                username: row.get(1)?,
                total_score: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn count_greater_than(conn: &Connection, total_score: i64) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM aggregates WHERE total_score > ?1",
        [total_score],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

fn standing_tx(conn: &mut Connection, player_id: PlayerId) -> Result<Option<PlayerStanding>, StoreError> {
    // One read transaction, so the total and the count see the same snapshot
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

    let total: Option<i64> = tx
        .query_row(
            "SELECT total_score FROM aggregates WHERE player_id = ?1",
            [player_id.value()],
            |row| row.get(0),
        )
        .optional()?;

    let standing = match total {
        Some(total_score) => Some(PlayerStanding {
            player_id,
            total_score,
            rank: count_greater_than(&tx, total_score)? + 1,
        }),
        None => None,
    };

    tx.commit()?;
    Ok(standing)
}

fn rank_snapshot_tx(conn: &mut Connection, gate: &CommitGate) -> Result<usize, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let totals = {
        let mut stmt = tx.prepare(
            "SELECT player_id, total_score FROM aggregates ORDER BY total_score DESC, player_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((PlayerId(row.get(0)?), row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let ranked = compute_ranks(totals);

    {
        let mut update = tx.prepare("UPDATE aggregates SET rank = ?2 WHERE player_id = ?1")?;
        for entry in &ranked {
            update.execute(params![entry.player_id.value(), entry.rank as i64])?;
        }
    }

    commit_unless_abandoned(tx, gate)?;
    Ok(ranked.len())
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn record_score(&self, event: ScoreEvent, on_commit: CommitHook) -> Result<Aggregate, StoreError> {
        self.run("record_score", move |conn, gate| {
            record_score_tx(conn, gate, &event, on_commit.as_ref())
        })
        .await
    }

    async fn aggregate(&self, player_id: PlayerId) -> Result<Option<Aggregate>, StoreError> {
        self.run("aggregate", move |conn, _| Ok(fetch_aggregate(conn, player_id)?))
            .await
    }

    async fn top_aggregates(&self, limit: usize) -> Result<Vec<ScoredPlayer>, StoreError> {
        self.run("top_aggregates", move |conn, _| Ok(fetch_top(conn, limit)?))
            .await
    }

    async fn player_standing(&self, player_id: PlayerId) -> Result<Option<PlayerStanding>, StoreError> {
        self.run("player_standing", move |conn, _| standing_tx(conn, player_id))
            .await
    }

    async fn store_rank_snapshot(&self) -> Result<usize, StoreError> {
        self.run("store_rank_snapshot", rank_snapshot_tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::types::GameMode;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;
    use tempfile::{tempdir, TempDir};

    /// Helper to create a test database with schema and a few players
    fn create_test_store(players: &[(i64, &str)]) -> (TempDir, SqliteScoreStore) {
        let dir = tempdir().unwrap();
        let store = SqliteScoreStore::new(dir.path().join("scores.db"));
        store.initialize_schema().unwrap();

        let conn = store.open_connection().unwrap();
        for (id, name) in players {
            conn.execute(
                "INSERT INTO players (id, username) VALUES (?1, ?2)",
                params![id, name],
            )
            .unwrap();
        }

        (dir, store)
    }

    fn event(player: i64, delta: i64) -> ScoreEvent {
        ScoreEvent::new(
            PlayerId(player),
            delta,
            GameMode::Solo,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
    }

    fn no_hook() -> CommitHook {
        Arc::new(|| {})
    }

    fn counting_hook() -> (CommitHook, Arc<AtomicU32>) {
        let commits = Arc::new(AtomicU32::new(0));
        let counter = commits.clone();
        let hook: CommitHook = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (hook, commits)
    }

    fn count_rows(store: &SqliteScoreStore, table: &str, player: i64) -> i64 {
        let conn = store.open_connection().unwrap();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE player_id = ?1", table),
            [player],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_submission_creates_aggregate() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);

        let aggregate = store.record_score(event(1, 50), no_hook()).await.unwrap();

        assert_eq!(aggregate.player_id, PlayerId(1));
        assert_eq!(aggregate.total_score, 50);
        assert_eq!(aggregate.rank, None);
        assert_eq!(count_rows(&store, "score_events", 1), 1);
    }

    #[tokio::test]
    async fn test_submissions_accumulate() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);

        store.record_score(event(1, 50), no_hook()).await.unwrap();
        let aggregate = store.record_score(event(1, 40), no_hook()).await.unwrap();

        assert_eq!(aggregate.total_score, 90);
        assert_eq!(count_rows(&store, "score_events", 1), 2);
        assert_eq!(count_rows(&store, "aggregates", 1), 1);
    }

    #[tokio::test]
    async fn test_event_row_contents() {
        let (_dir, store) = create_test_store(&[(3, "carol")]);

        let mut team_event = event(3, 25);
        team_event.mode = GameMode::Team;
        store.record_score(team_event, no_hook()).await.unwrap();

        let conn = store.open_connection().unwrap();
        let (delta, mode, occurred_at): (i64, String, i64) = conn
            .query_row(
                "SELECT score_delta, mode, occurred_at FROM score_events WHERE player_id = 3",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(delta, 25);
        assert_eq!(mode, "team");
        assert_eq!(occurred_at, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_unknown_player_leaves_no_rows() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);

        let result = store.record_score(event(99, 10), no_hook()).await;

        assert!(matches!(result, Err(StoreError::PlayerNotFound(PlayerId(99)))));
        assert_eq!(count_rows(&store, "score_events", 99), 0);
        assert_eq!(count_rows(&store, "aggregates", 99), 0);
    }

    #[tokio::test]
    async fn test_top_aggregates_order_and_limit() {
        let (_dir, store) = create_test_store(&[(1, "alice"), (2, "bob"), (3, "carol")]);

        store.record_score(event(1, 30), no_hook()).await.unwrap();
        store.record_score(event(2, 70), no_hook()).await.unwrap();
        store.record_score(event(3, 50), no_hook()).await.unwrap();

        let top = store.top_aggregates(2).await.unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].player_id, PlayerId(2));
        assert_eq!(top[0].username.as_deref(), Some("bob"));
        assert_eq!(top[0].total_score, 70);
        assert_eq!(top[1].player_id, PlayerId(3));
    }

    #[tokio::test]
    async fn test_top_aggregates_huge_limit() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);
        store.record_score(event(1, 5), no_hook()).await.unwrap();

        let top = store.top_aggregates(usize::MAX).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn test_player_standing_counts_strictly_greater() {
        let (_dir, store) =
            create_test_store(&[(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")]);

        store.record_score(event(1, 100), no_hook()).await.unwrap();
        store.record_score(event(2, 100), no_hook()).await.unwrap();
        store.record_score(event(3, 90), no_hook()).await.unwrap();

        let standing = store.player_standing(PlayerId(2)).await.unwrap().unwrap();
        assert_eq!(standing.rank, 1);

        let standing = store.player_standing(PlayerId(3)).await.unwrap().unwrap();
        assert_eq!(standing.total_score, 90);
        assert_eq!(standing.rank, 3);

        // Player exists but never submitted
        assert!(store.player_standing(PlayerId(4)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rank_snapshot_written() {
        let (_dir, store) = create_test_store(&[(1, "alice"), (2, "bob"), (3, "carol")]);

        store.record_score(event(1, 100), no_hook()).await.unwrap();
        store.record_score(event(2, 100), no_hook()).await.unwrap();
        store.record_score(event(3, 90), no_hook()).await.unwrap();

        let written = store.store_rank_snapshot().await.unwrap();
        assert_eq!(written, 3);

        let conn = store.open_connection().unwrap();
        let ranks: Vec<(i64, i64)> = conn
            .prepare("SELECT player_id, rank FROM aggregates ORDER BY player_id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(ranks, vec![(1, 1), (2, 1), (3, 3)]);

        let stored = store.aggregate(PlayerId(2)).await.unwrap().unwrap();
        assert_eq!(stored.rank, Some(1));
        assert!(store.aggregate(PlayerId(42)).await.unwrap().is_none());

        // Next upsert returns the stored snapshot untouched
        let aggregate = store.record_score(event(3, 1), no_hook()).await.unwrap();
        assert_eq!(aggregate.rank, Some(3));
    }

    #[tokio::test]
    async fn test_commit_hook_runs_once_per_commit() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);
        let (hook, commits) = counting_hook();

        store.record_score(event(1, 10), hook.clone()).await.unwrap();
        store.record_score(event(1, 20), hook.clone()).await.unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 2);

        // Rolled back, so no hook
        assert!(store.record_score(event(99, 10), hook).await.is_err());
        assert_eq!(commits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_rolls_back_late_writer() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);
        // Busy wait far longer than the call deadline
        let store = store
            .with_busy_timeout(Duration::from_secs(5))
            .with_call_timeout(Duration::from_millis(50));
        let (hook, commits) = counting_hook();

        // Hold the write lock so the submission waits on busy_timeout
        let blocker = store.open_connection().unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let result = store.record_score(event(1, 10), hook).await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(50)));
        assert!(!result.unwrap_err().outcome_unknown());

        // Let the abandoned worker take the lock and reach its commit point
        blocker.execute_batch("ROLLBACK").unwrap();
        drop(blocker);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Queues behind the abandoned worker if it is still running
        let fresh = SqliteScoreStore::new(store.db_path());
        let aggregate = fresh.record_score(event(1, 5), no_hook()).await.unwrap();
        assert_eq!(aggregate.total_score, 5);
        assert_eq!(count_rows(&store, "score_events", 1), 1);
        assert_eq!(commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_call_rolls_back() {
        let (_dir, store) = create_test_store(&[(1, "alice")]);
        let (hook, commits) = counting_hook();

        let blocker = store.open_connection().unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        // Caller gives up well before the store's own deadline
        let elapsed = tokio::time::timeout(
            Duration::from_millis(50),
            store.record_score(event(1, 10), hook),
        )
        .await;
        assert!(elapsed.is_err());

        blocker.execute_batch("ROLLBACK").unwrap();
        drop(blocker);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let aggregate = store.record_score(event(1, 7), no_hook()).await.unwrap();
        assert_eq!(aggregate.total_score, 7);
        assert_eq!(commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_commit_gate_decides_once() {
        let gate = CommitGate::default();
        assert!(gate.begin_commit());
        assert!(!gate.abandon());
        assert!(!gate.is_abandoned());

        let gate = CommitGate::default();
        assert!(gate.abandon());
        assert!(gate.is_abandoned());
        assert!(!gate.begin_commit());
    }

    #[test]
    fn test_embedded_schema_in_file_name_order() {
        let names: Vec<_> = EMBEDDED_SCHEMA.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_run_schema_migrations_from_dir() {
        let dir = tempdir().unwrap();
        let schema_dir = dir.path().join("sql");
        fs::create_dir(&schema_dir).unwrap();
        // Written out of order on purpose
        for (name, sql) in EMBEDDED_SCHEMA.iter().rev() {
            fs::write(schema_dir.join(name), sql).unwrap();
        }
        fs::write(schema_dir.join("readme.md"), "not sql").unwrap();

        let conn = Connection::open(dir.path().join("migrate.db")).unwrap();

        assert_eq!(run_schema_migrations(&conn, &schema_dir).unwrap(), 3);
        // Idempotent
        assert_eq!(run_schema_migrations(&conn, &schema_dir).unwrap(), 3);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('players', 'score_events', 'aggregates')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_migration_errors() {
        let dir = tempdir().unwrap();
        let conn = Connection::open(dir.path().join("missing.db")).unwrap();

        let result = run_schema_migrations(&conn, "/definitely/not/here");
        assert!(matches!(result, Err(StoreError::Schema(_))));

        let schema_dir = dir.path().join("broken");
        fs::create_dir(&schema_dir).unwrap();
        fs::write(schema_dir.join("00_bad.sql"), "CREATE TABLE (").unwrap();

        let err = run_schema_migrations(&conn, &schema_dir).unwrap_err();
        assert!(err.to_string().contains("00_bad.sql"));
        assert!(!err.is_transient());
    }
}
