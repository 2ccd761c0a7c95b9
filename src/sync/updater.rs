//! Background refresh loop.
//!
//! Periodically asks the coordinator to refresh every due channel.

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use super::ingest::Ingestor;

/// Default check interval in seconds (5 minutes).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// Timer loop driving the ingestion coordinator.
pub struct SyncUpdater {
    ingestor: Ingestor,
    check_interval: Duration,
}

impl SyncUpdater {
    /// Create an updater with the default check interval.
    pub fn new(ingestor: Ingestor) -> Self {
        Self::with_interval(ingestor, DEFAULT_CHECK_INTERVAL_SECS)
    }

    /// Create an updater with a custom check interval.
    pub fn with_interval(ingestor: Ingestor, interval_secs: u64) -> Self {
        Self {
            ingestor,
            check_interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run the updater loop indefinitely.
    pub async fn run(&self) {
        info!(
            "Sync updater started (check interval: {} seconds)",
            self.check_interval.as_secs()
        );

        let mut timer = interval(self.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        debug!("Checking for channels due for refresh");
        if let Err(e) = self.ingestor.run_due(Utc::now()).await {
            error!("Failed to list channels due for refresh: {}", e);
        }
    }
}

/// Start the updater as a background task.
pub fn start_sync_updater(ingestor: Ingestor, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    let updater = SyncUpdater::with_interval(ingestor, interval_secs);
    tokio::spawn(async move {
        updater.run().await;
    })
}
