//! Synchronization engine.
//!
//! Scheduling, dedup, blacklist filtering, refresh cycles and retention.

mod blacklist;
mod dedup;
mod ingest;
mod lease;
mod retention;
mod scheduler;
mod updater;

pub use blacklist::BlacklistFilter;
pub use dedup::DedupIndex;
pub use ingest::{CycleReport, CycleState, IngestSettings, Ingestor};
pub use lease::{ChannelLease, ChannelLocks};
pub use retention::{start_retention_sweeper, RetentionSweeper};
pub use scheduler::ChannelScheduler;
pub use updater::{start_sync_updater, SyncUpdater, DEFAULT_CHECK_INTERVAL_SECS};
