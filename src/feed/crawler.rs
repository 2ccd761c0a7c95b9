//! Crawler engines.
//!
//! A crawler turns a channel's link into parsed entries. Two engines are
//! provided: [`FeedRsCrawler`] (RSS, Atom and JSON Feed via feed-rs) and
//! [`RssCrawler`] (strict RSS 2.0 via the rss crate). [`CrawlerRegistry`]
//! picks one per channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;

use super::fetcher::{strip_html, truncate_chars, Downloader, FetchSettings};
use super::types::{Channel, CrawlerEngine, ParsedEntry};
use crate::config::SyncConfig;
use crate::{FeedmillError, Result};

/// Fetches and parses a channel's feed document.
#[async_trait]
pub trait FeedCrawler: Send + Sync {
    /// Fetch the channel's current entries.
    async fn fetch(&self, channel: &Channel) -> Result<Vec<ParsedEntry>>;
}

/// feed-rs based crawler.
#[derive(Debug, Clone)]
pub struct FeedRsCrawler {
    downloader: Arc<Downloader>,
}

impl FeedRsCrawler {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl FeedCrawler for FeedRsCrawler {
    async fn fetch(&self, channel: &Channel) -> Result<Vec<ParsedEntry>> {
        let bytes = self.downloader.download(&channel.link).await?;
        parse_with_feed_rs(&bytes, self.downloader.settings())
    }
}

/// rss crate based crawler.
#[derive(Debug, Clone)]
pub struct RssCrawler {
    downloader: Arc<Downloader>,
}

impl RssCrawler {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl FeedCrawler for RssCrawler {
    async fn fetch(&self, channel: &Channel) -> Result<Vec<ParsedEntry>> {
        let bytes = self.downloader.download(&channel.link).await?;
        parse_with_rss(&bytes, self.downloader.settings())
    }
}

fn clean_description(text: &str, settings: &FetchSettings) -> Option<String> {
    let cleaned = truncate_chars(&strip_html(text), settings.max_content_length);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a document with feed-rs.
pub fn parse_with_feed_rs(bytes: &[u8], settings: &FetchSettings) -> Result<Vec<ParsedEntry>> {
    let feed = parser::parse(bytes)
        .map_err(|e| FeedmillError::Fetch(format!("failed to parse feed: {}", e)))?;

    let entries = feed
        .entries
        .into_iter()
        .take(settings.max_entries)
        .map(|entry| {
            let content = entry.content.and_then(|c| c.body);
            let description = entry
                .summary
                .map(|t| t.content)
                .or_else(|| content.clone())
                .and_then(|d| clean_description(&d, settings));

            ParsedEntry {
                guid: non_blank(Some(entry.id)),
                title: entry
                    .title
                    .map(|t| strip_html(&t.content))
                    .unwrap_or_default(),
                link: entry.links.into_iter().next().map(|l| l.href),
                description,
                author: entry.authors.into_iter().next().map(|a| a.name),
                content,
                published_at: entry.published.or(entry.updated),
            }
        })
        .collect();

    Ok(entries)
}

/// Parse an RSS 2.0 document with the rss crate.
pub fn parse_with_rss(bytes: &[u8], settings: &FetchSettings) -> Result<Vec<ParsedEntry>> {
    let channel = rss::Channel::read_from(bytes)
        .map_err(|e| FeedmillError::Fetch(format!("failed to parse feed: {}", e)))?;

    let entries = channel
        .items()
        .iter()
        .take(settings.max_entries)
        .map(|item| ParsedEntry {
            guid: non_blank(item.guid().map(|g| g.value().to_string())),
            title: item.title().map(strip_html).unwrap_or_default(),
            link: non_blank(item.link().map(str::to_string)),
            description: item
                .description()
                .and_then(|d| clean_description(d, settings)),
            author: non_blank(item.author().map(str::to_string)),
            content: item.content().map(str::to_string),
            published_at: item.pub_date().and_then(parse_rfc2822),
        })
        .collect();

    Ok(entries)
}

fn parse_rfc2822(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Maps channels to crawler engines.
#[derive(Clone)]
pub struct CrawlerRegistry {
    default_engine: CrawlerEngine,
    crawlers: HashMap<CrawlerEngine, Arc<dyn FeedCrawler>>,
}

impl CrawlerRegistry {
    /// Create an empty registry.
    pub fn new(default_engine: CrawlerEngine) -> Self {
        Self {
            default_engine,
            crawlers: HashMap::new(),
        }
    }

    /// Create a registry with both HTTP engines sharing one client.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let downloader = Arc::new(Downloader::new(FetchSettings::from(config))?);
        Ok(Self::new(config.default_engine)
            .with_crawler(
                CrawlerEngine::FeedRs,
                Arc::new(FeedRsCrawler::new(Arc::clone(&downloader))),
            )
            .with_crawler(CrawlerEngine::Rss, Arc::new(RssCrawler::new(downloader))))
    }

    /// Register a crawler for an engine.
    pub fn with_crawler(mut self, engine: CrawlerEngine, crawler: Arc<dyn FeedCrawler>) -> Self {
        self.crawlers.insert(engine, crawler);
        self
    }

    /// Engine used when a channel has no override.
    pub fn default_engine(&self) -> CrawlerEngine {
        self.default_engine
    }

    /// Engine a channel resolves to.
    pub fn engine_for(&self, channel: &Channel) -> CrawlerEngine {
        channel.crawler_engine.unwrap_or(self.default_engine)
    }

    /// Crawler for a channel.
    pub fn select(&self, channel: &Channel) -> Result<Arc<dyn FeedCrawler>> {
        let engine = self.engine_for(channel);
        self.crawlers
            .get(&engine)
            .cloned()
            .ok_or_else(|| FeedmillError::Fetch(format!("no crawler registered for {}", engine)))
    }
}

impl std::fmt::Debug for CrawlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerRegistry")
            .field("default_engine", &self.default_engine)
            .field("engines", &self.crawlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
