//! Ingestion coordinator.
//!
//! Runs one refresh cycle per channel:
//! `Idle -> Fetching -> Reconciling -> Persisting -> Completed`, with `Failed`
//! reachable from any non-terminal state. A failed cycle is recorded on its
//! own channel and never affects other channels.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::blacklist::BlacklistFilter;
use super::dedup::DedupIndex;
use super::lease::ChannelLocks;
use super::scheduler::ChannelScheduler;
use crate::config::SyncConfig;
use crate::feed::{
    BlacklistItem, Channel, CrawlerEngine, CrawlerRegistry, InsertOutcome, NewFeedItem,
    StorageGateway,
};
use crate::{FeedmillError, Result};

/// State of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Completed,
    Failed,
    /// Another cycle held the channel lease.
    Skipped,
}

impl CycleState {
    /// Whether the cycle has finished.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CycleState::Completed | CycleState::Failed | CycleState::Skipped
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Reconciling => "reconciling",
            CycleState::Persisting => "persisting",
            CycleState::Completed => "completed",
            CycleState::Failed => "failed",
            CycleState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub channel_id: i64,
    pub state: CycleState,
    /// Entries returned by the crawler, after the per-fetch cap.
    pub fetched: usize,
    pub inserted: usize,
    /// Entries dropped as already known.
    pub duplicates: usize,
    pub blacklisted: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl CycleReport {
    fn new(channel_id: i64) -> Self {
        Self {
            channel_id,
            state: CycleState::Idle,
            fetched: 0,
            inserted: 0,
            duplicates: 0,
            blacklisted: 0,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    fn failed(channel_id: i64, message: String) -> Self {
        Self {
            state: CycleState::Failed,
            error: Some(message),
            ..Self::new(channel_id)
        }
    }

    fn transition(&mut self, state: CycleState) {
        debug!("Channel {}: {} -> {}", self.channel_id, self.state, state);
        self.state = state;
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSettings {
    /// Upper bound for one fetch.
    pub fetch_timeout: Duration,
    /// Maximum entries taken from one fetch.
    pub max_entries: usize,
    /// Warm the dedup index once per cycle.
    pub warm_dedup_cache: bool,
    /// Maximum cycles running at once.
    pub max_concurrency: usize,
}

impl From<&SyncConfig> for IngestSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout(),
            max_entries: config.max_entries_per_fetch,
            warm_dedup_cache: config.warm_dedup_cache,
            max_concurrency: config.max_concurrency,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// Drives refresh cycles against a storage gateway.
#[derive(Clone)]
pub struct Ingestor {
    gateway: Arc<dyn StorageGateway>,
    crawlers: Arc<CrawlerRegistry>,
    blacklist: Arc<BlacklistFilter>,
    scheduler: ChannelScheduler,
    locks: ChannelLocks,
    limiter: Arc<Semaphore>,
    settings: IngestSettings,
}

impl Ingestor {
    /// Create a coordinator.
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        crawlers: CrawlerRegistry,
        blacklist: BlacklistFilter,
        scheduler: ChannelScheduler,
        settings: IngestSettings,
    ) -> Self {
        Self {
            gateway,
            crawlers: Arc::new(crawlers),
            blacklist: Arc::new(blacklist),
            scheduler,
            locks: ChannelLocks::new(),
            limiter: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            settings,
        }
    }

    /// Channel leases held by running cycles.
    pub fn locks(&self) -> &ChannelLocks {
        &self.locks
    }

    /// Run every due active channel as its own task.
    ///
    /// Listing failures are returned; per-channel failures are reported in
    /// the returned cycle reports.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<CycleReport>> {
        let channels = self.gateway.list_active_channels().await?;
        let due = self.scheduler.due_channels(channels, now);

        if due.is_empty() {
            debug!("No channels due for refresh");
            return Ok(Vec::new());
        }

        info!("Refreshing {} due channel(s)", due.len());

        let mut channel_ids = Vec::with_capacity(due.len());
        let mut tasks = Vec::with_capacity(due.len());
        for channel in due {
            channel_ids.push(channel.id);
            let ingestor = self.clone();
            tasks.push(tokio::spawn(async move {
                // The semaphore is never closed
                let _permit = Arc::clone(&ingestor.limiter).acquire_owned().await.ok();
                ingestor.run_cycle(&channel).await
            }));
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for (channel_id, joined) in channel_ids.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let message = format!("cycle task failed: {}", e);
                    error!("Channel {}: {}", channel_id, message);
                    self.record_failure(channel_id, &message).await;
                    reports.push(CycleReport::failed(channel_id, message));
                }
            }
        }

        let failed = reports
            .iter()
            .filter(|r| r.state == CycleState::Failed)
            .count();
        info!(
            "Refresh finished: {} channel(s), {} failed",
            reports.len(),
            failed
        );

        Ok(reports)
    }

    /// Run one refresh cycle for a channel.
    ///
    /// Virtual channels go through the same steps but nothing is persisted.
    pub async fn run_cycle(&self, channel: &Channel) -> CycleReport {
        let started = Instant::now();
        let cycle_start = Utc::now();
        let mut report = CycleReport::new(channel.id);

        let _lease = if channel.is_virtual() {
            None
        } else {
            match self.locks.try_acquire(channel.id) {
                Some(lease) => Some(lease),
                None => {
                    debug!("Channel {} already refreshing, skipping", channel.id);
                    report.transition(CycleState::Skipped);
                    return report;
                }
            }
        };

        match self.execute(channel, cycle_start, &mut report).await {
            Ok(()) => {
                report.transition(CycleState::Completed);
                if report.inserted > 0 {
                    info!(
                        "Channel {} refreshed: {} new item(s)",
                        channel.id, report.inserted
                    );
                } else {
                    debug!("Channel {} refreshed: no new items", channel.id);
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    "Channel {} failed while {}: {}",
                    channel.id, report.state, message
                );
                report.transition(CycleState::Failed);
                self.record_failure(channel.id, &message).await;
                report.error = Some(message);
            }
        }

        report.elapsed = started.elapsed();
        report
    }

    async fn execute(
        &self,
        channel: &Channel,
        cycle_start: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let gateway = self.gateway.as_ref();

        report.transition(CycleState::Fetching);
        let crawler = self.crawlers.select(channel)?;
        let mut entries = match timeout(self.settings.fetch_timeout, crawler.fetch(channel)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(FeedmillError::Fetch(format!(
                    "fetch timed out after {} ms",
                    self.settings.fetch_timeout.as_millis()
                )))
            }
        };
        entries.truncate(self.settings.max_entries);
        report.fetched = entries.len();

        report.transition(CycleState::Reconciling);
        let mut index =
            DedupIndex::open(gateway, channel.id, self.settings.warm_dedup_cache).await?;
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for entry in &entries {
            let item = NewFeedItem::from_entry(channel.id, entry);
            if !seen.insert(item.feed_item_key.clone())
                || index.exists(gateway, &item.feed_item_key).await?
            {
                report.duplicates += 1;
                continue;
            }
            fresh.push(item);
        }

        report.transition(CycleState::Persisting);
        let mut candidates = Vec::with_capacity(fresh.len());
        for item in &fresh {
            match gateway.insert_feed_item(item).await? {
                InsertOutcome::Inserted(id) => {
                    index.record(&item.feed_item_key);
                    candidates.push(BlacklistItem::new(id, item.title.clone()));
                    report.inserted += 1;
                }
                // Stored concurrently since reconciliation
                InsertOutcome::Duplicate => report.duplicates += 1,
            }
        }

        report.blacklisted = self.blacklist.evaluate(gateway, &candidates).await?;
        gateway.mark_channel_refreshed(channel.id, cycle_start).await?;

        Ok(())
    }

    async fn record_failure(&self, channel_id: i64, message: &str) {
        if let Err(e) = self
            .gateway
            .update_channel_error_status(channel_id, true, message)
            .await
        {
            error!(
                "Failed to record error status for channel {}: {}",
                channel_id, e
            );
        }
    }

    /// Set or clear a channel's crawler engine override.
    pub async fn update_channel_default_engine(
        &self,
        channel_id: i64,
        engine: Option<CrawlerEngine>,
    ) -> Result<bool> {
        let updated = self
            .gateway
            .update_channel_default_engine(channel_id, engine)
            .await?;
        match engine {
            Some(engine) => info!("Channel {} now uses {}", channel_id, engine),
            None => info!(
                "Channel {} now uses the default engine ({})",
                channel_id,
                self.crawlers.default_engine()
            ),
        }
        Ok(updated)
    }
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("crawlers", &self.crawlers)
            .field("scheduler", &self.scheduler)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(CycleState::Completed.is_terminal());
        assert!(CycleState::Failed.is_terminal());
        assert!(CycleState::Skipped.is_terminal());
        assert!(!CycleState::Idle.is_terminal());
        assert!(!CycleState::Fetching.is_terminal());
        assert!(!CycleState::Reconciling.is_terminal());
        assert!(!CycleState::Persisting.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CycleState::Reconciling.to_string(), "reconciling");
        assert_eq!(CycleState::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_report_transition() {
        let mut report = CycleReport::new(3);
        assert_eq!(report.state, CycleState::Idle);
        report.transition(CycleState::Fetching);
        assert_eq!(report.state, CycleState::Fetching);

        let failed = CycleReport::failed(3, "boom".to_string());
        assert_eq!(failed.state, CycleState::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = SyncConfig {
            fetch_timeout_secs: 2,
            max_concurrency: 9,
            warm_dedup_cache: false,
            ..SyncConfig::default()
        };
        let settings = IngestSettings::from(&config);
        assert_eq!(settings.fetch_timeout, Duration::from_secs(2));
        assert_eq!(settings.max_concurrency, 9);
        assert!(!settings.warm_dedup_cache);
        assert_eq!(settings.max_entries, 100);
    }
}
