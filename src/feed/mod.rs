//! Feed module for feedmill.
//!
//! This module provides the channel and feed item model, the storage gateway
//! and the crawler engines that fetch feed documents.

pub mod crawler;
pub mod fetcher;
pub mod gateway;
pub mod normalize;
mod types;

pub use crawler::{CrawlerRegistry, FeedCrawler, FeedRsCrawler, RssCrawler};
pub use fetcher::{validate_url, Downloader, FetchSettings};
pub use gateway::{GatewaySettings, RetentionPolicy, SqliteGateway, StorageGateway};
pub use types::{
    BlacklistItem, Channel, CrawlerEngine, FeedItem, InsertOutcome, NewChannel, NewFeedItem,
    ParsedEntry, MAX_DESCRIPTION_LENGTH,
};
