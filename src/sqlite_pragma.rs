//! Shared SQLite connection tuning
//!
//! Every connection the engine opens goes through `apply_optimized_pragmas`
//! so readers and writers agree on journal mode and locking behavior.

use rusqlite::Connection;
use std::time::Duration;

/// Default time a connection waits on a locked database before SQLITE_BUSY
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Apply PRAGMAs used by all engine connections
///
/// - `journal_mode = WAL`: readers never block the single writer
/// - `synchronous = NORMAL`: durable at checkpoint, safe with WAL
/// - `temp_store = MEMORY`
/// - `foreign_keys = ON`: score rows must reference a real player
/// - `wal_autocheckpoint = 1000` pages
pub fn apply_optimized_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    Ok(())
}

/// Open a tuned connection with a bounded busy timeout
pub fn open_tuned_connection(
    db_path: impl AsRef<std::path::Path>,
    busy_timeout: Duration,
) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    apply_optimized_pragmas(&conn)?;
    Ok(conn)
}
