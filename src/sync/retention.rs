//! Retention sweeper.
//!
//! Periodically purges settled (checked) items according to the gateway's
//! retention policy. Safe to run while cycles are ingesting.

use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::feed::StorageGateway;
use crate::Result;

/// Background purge of stale items.
pub struct RetentionSweeper {
    gateway: Arc<dyn StorageGateway>,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper running every `interval_secs` seconds.
    pub fn new(gateway: Arc<dyn StorageGateway>, interval_secs: u64) -> Self {
        Self {
            gateway,
            sweep_interval: Duration::from_secs(interval_secs),
        }
    }

    /// Run one purge. Returns the number of rows removed.
    pub async fn sweep(&self) -> Result<u64> {
        let removed = self.gateway.purge_stale_items().await?;
        if removed > 0 {
            info!("Retention sweep removed {} item(s)", removed);
        } else {
            debug!("Retention sweep removed nothing");
        }
        Ok(removed)
    }

    /// Run the sweep loop indefinitely.
    pub async fn run(&self) {
        info!(
            "Retention sweeper started (interval: {} seconds)",
            self.sweep_interval.as_secs()
        );

        let mut timer = interval(self.sweep_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Retention sweep failed: {}", e);
            }
        }
    }
}

/// Start the sweeper as a background task.
pub fn start_retention_sweeper(
    gateway: Arc<dyn StorageGateway>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    let sweeper = RetentionSweeper::new(gateway, interval_secs);
    tokio::spawn(async move {
        sweeper.run().await;
    })
}
