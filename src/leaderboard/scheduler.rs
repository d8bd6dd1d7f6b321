//! Background tasks for the leaderboard

use super::engine::Leaderboard;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Rank refresh task - periodically snapshot RANK() into `aggregates.rank`
///
/// The write path never touches stored ranks; this keeps the column close to
/// live for consumers that read the table directly. Failures are logged and
/// the next tick tries again.
///
/// Arguments:
/// - `leaderboard`: Shared leaderboard instance
/// - `refresh_interval_ms`: Refresh interval in milliseconds (must be > 0)
///
/// This function runs indefinitely until cancelled.
pub async fn rank_refresh_task(leaderboard: Arc<Leaderboard>, refresh_interval_ms: u64) {
    log::info!("⏰ Starting rank refresh scheduler (interval: {}ms)", refresh_interval_ms);

    let mut timer = interval(Duration::from_millis(refresh_interval_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        match leaderboard.refresh_stored_ranks().await {
            Ok(0) => {}
            Ok(rows) => {
                log::debug!("✅ Rank refresh wrote {} rows", rows);
            }
            Err(e) => {
                log::error!("❌ Rank refresh failed: {}", e);
            }
        }
    }
}
