//! feedmill - feed synchronization and reconciliation engine
//!
//! Keeps a local store of feed channels and items in step with their remote
//! sources: schedules refreshes, drops duplicates, applies blacklist rules and
//! purges settled items.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod sync;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FeedmillError, Result};
pub use feed::{
    BlacklistItem, Channel, CrawlerEngine, CrawlerRegistry, FeedCrawler, FeedItem,
    GatewaySettings, InsertOutcome, NewChannel, NewFeedItem, ParsedEntry, RetentionPolicy,
    SqliteGateway, StorageGateway,
};
pub use sync::{
    BlacklistFilter, ChannelScheduler, CycleReport, CycleState, IngestSettings, Ingestor,
    RetentionSweeper, SyncUpdater,
};
