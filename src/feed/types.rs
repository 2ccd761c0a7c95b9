//! Feed types for feedmill.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Maximum length for a feed item description.
pub const MAX_DESCRIPTION_LENGTH: usize = 10000;

/// Crawler engine used to fetch and parse a channel's feed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlerEngine {
    /// reqwest + feed-rs; auto-detects RSS, Atom and JSON Feed.
    #[default]
    FeedRs,
    /// reqwest + rss; strict RSS 2.0 channel reader.
    Rss,
}

impl CrawlerEngine {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        match self {
            CrawlerEngine::FeedRs => 1,
            CrawlerEngine::Rss => 2,
        }
    }

    /// Decode a stored integer code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(CrawlerEngine::FeedRs),
            2 => Some(CrawlerEngine::Rss),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerEngine::FeedRs => write!(f, "feed_rs"),
            CrawlerEngine::Rss => write!(f, "rss"),
        }
    }
}

/// A registered feed source.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Channel ID. Zero or negative marks a virtual channel.
    pub id: i64,
    /// Channel title.
    pub title: String,
    /// Feed URL.
    pub link: String,
    /// Channel description.
    pub description: String,
    /// Language code.
    pub language: String,
    /// Copyright notice.
    pub copyright: String,
    /// Image URL.
    pub image_url: String,
    /// Raw text of the feed's root descriptor.
    pub original_document: String,
    /// Crawler engine override; `None` uses the system default.
    pub crawler_engine: Option<CrawlerEngine>,
    /// Refresh interval in minutes; always positive when present.
    pub refresh_interval_minutes: Option<u32>,
    /// Last successful refresh.
    pub last_updated_date: Option<DateTime<Utc>>,
    /// Type discriminator.
    pub channel_type: Option<i32>,
    /// Whether the channel takes part in scheduling.
    pub is_active: bool,
    /// Whether the last cycle failed.
    pub is_error: bool,
    /// Diagnostic from the last failed cycle.
    pub error_message: String,
}

impl Channel {
    /// Create an ad-hoc channel that is never persisted.
    pub fn virtual_channel(link: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: String::new(),
            link: link.into(),
            description: String::new(),
            language: String::new(),
            copyright: String::new(),
            image_url: String::new(),
            original_document: String::new(),
            crawler_engine: None,
            refresh_interval_minutes: None,
            last_updated_date: None,
            channel_type: None,
            is_active: false,
            is_error: false,
            error_message: String::new(),
        }
    }

    /// Whether this is a virtual (non-persisted) channel.
    pub fn is_virtual(&self) -> bool {
        super::normalize::is_virtual_channel(self.id)
    }
}

/// New channel for creation.
#[derive(Debug, Clone)]
pub struct NewChannel {
    /// Channel title.
    pub title: String,
    /// Feed URL.
    pub link: String,
    /// Channel description.
    pub description: String,
    /// Crawler engine override.
    pub crawler_engine: Option<CrawlerEngine>,
    /// Refresh interval in minutes.
    pub refresh_interval_minutes: Option<i32>,
    /// Type discriminator.
    pub channel_type: Option<i32>,
    /// Whether the channel is active.
    pub is_active: bool,
}

impl NewChannel {
    /// Create a new active channel.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: String::new(),
            crawler_engine: None,
            refresh_interval_minutes: None,
            channel_type: None,
            is_active: true,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the crawler engine override.
    pub fn with_engine(mut self, engine: CrawlerEngine) -> Self {
        self.crawler_engine = Some(engine);
        self
    }

    /// Set the raw refresh interval (stored as given, normalized on read).
    pub fn with_refresh_interval(mut self, minutes: i32) -> Self {
        self.refresh_interval_minutes = Some(minutes);
        self
    }

    /// Mark the channel inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A persisted feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// Item ID.
    pub id: i64,
    /// Owning channel.
    pub channel_id: i64,
    /// Dedup key, unique within the channel.
    pub feed_item_key: String,
    /// Item title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Item description.
    pub description: String,
    /// Publishing date, never the zero value.
    pub publishing_date: DateTime<Utc>,
    /// Author name.
    pub author: String,
    /// Full content.
    pub content: String,
    /// Review flag.
    pub is_checked: bool,
    /// When the gateway stored the item.
    pub ingested_at: DateTime<Utc>,
}

/// New feed item for insertion.
#[derive(Debug, Clone)]
pub struct NewFeedItem {
    /// Owning channel.
    pub channel_id: i64,
    /// Dedup key.
    pub feed_item_key: String,
    /// Item title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Item description.
    pub description: String,
    /// Publishing date; absent or zero is replaced at insert.
    pub publishing_date: Option<DateTime<Utc>>,
    /// Author name.
    pub author: String,
    /// Full content.
    pub content: String,
}

impl NewFeedItem {
    /// Create a new item.
    pub fn new(channel_id: i64, key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            channel_id,
            feed_item_key: key.into(),
            title: title.into(),
            link: String::new(),
            description: String::new(),
            publishing_date: None,
            author: String::new(),
            content: String::new(),
        }
    }

    /// Build an item from a parsed entry.
    pub fn from_entry(channel_id: i64, entry: &ParsedEntry) -> Self {
        Self {
            channel_id,
            feed_item_key: entry.dedup_key(),
            title: entry.title.clone(),
            link: entry.link.clone().unwrap_or_default(),
            description: entry.description.clone().unwrap_or_default(),
            publishing_date: entry.published_at,
            author: entry.author.clone().unwrap_or_default(),
            content: entry.content.clone().unwrap_or_default(),
        }
    }

    /// Set the publishing date.
    pub fn with_publishing_date(mut self, date: DateTime<Utc>) -> Self {
        self.publishing_date = Some(date);
        self
    }
}

/// Result of inserting a feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The item was stored under this ID.
    Inserted(i64),
    /// The channel already had an item with the same key.
    Duplicate,
}

/// A blacklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistItem {
    /// Referenced feed item.
    pub feed_item_id: i64,
    /// Title that matched.
    pub title: String,
}

impl BlacklistItem {
    /// Create a new blacklist entry.
    pub fn new(feed_item_id: i64, title: impl Into<String>) -> Self {
        Self {
            feed_item_id,
            title: title.into(),
        }
    }

    /// Whether the entry can be written: positive ID and a non-blank title.
    pub fn is_valid(&self) -> bool {
        self.feed_item_id > 0 && !self.title.trim().is_empty()
    }
}

impl From<&FeedItem> for BlacklistItem {
    fn from(item: &FeedItem) -> Self {
        Self::new(item.id, item.title.clone())
    }
}

/// Entry parsed by a crawler engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    /// RSS guid or Atom id.
    pub guid: Option<String>,
    /// Entry title.
    pub title: String,
    /// Link to the original article.
    pub link: Option<String>,
    /// Description with HTML stripped.
    pub description: Option<String>,
    /// Author name.
    pub author: Option<String>,
    /// Full content.
    pub content: Option<String>,
    /// Publishing date.
    pub published_at: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// Dedup key: the guid when present, otherwise a digest of link and title.
    pub fn dedup_key(&self) -> String {
        match self.guid.as_deref().map(str::trim) {
            Some(guid) if !guid.is_empty() => guid.to_string(),
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(self.link.as_deref().unwrap_or_default().as_bytes());
                hasher.update(b"\n");
                hasher.update(self.title.as_bytes());
                format!("{:x}", hasher.finalize())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_codes() {
        assert_eq!(CrawlerEngine::from_code(CrawlerEngine::FeedRs.code()), Some(CrawlerEngine::FeedRs));
        assert_eq!(CrawlerEngine::from_code(CrawlerEngine::Rss.code()), Some(CrawlerEngine::Rss));
        assert_eq!(CrawlerEngine::from_code(0), None);
        assert_eq!(CrawlerEngine::from_code(99), None);
    }

    #[test]
    fn test_engine_display() {
        assert_eq!(CrawlerEngine::FeedRs.to_string(), "feed_rs");
        assert_eq!(CrawlerEngine::Rss.to_string(), "rss");
    }

    #[test]
    fn test_virtual_channel() {
        let channel = Channel::virtual_channel("https://example.com/feed.xml");
        assert!(channel.is_virtual());
        assert_eq!(channel.link, "https://example.com/feed.xml");

        let negative = Channel { id: -3, ..channel.clone() };
        assert!(negative.is_virtual());

        let real = Channel { id: 1, ..channel };
        assert!(!real.is_virtual());
    }

    #[test]
    fn test_new_channel_builder() {
        let channel = NewChannel::new("News", "https://example.com/rss")
            .with_description("Daily news")
            .with_engine(CrawlerEngine::Rss)
            .with_refresh_interval(15)
            .inactive();
        assert_eq!(channel.title, "News");
        assert_eq!(channel.description, "Daily news");
        assert_eq!(channel.crawler_engine, Some(CrawlerEngine::Rss));
        assert_eq!(channel.refresh_interval_minutes, Some(15));
        assert!(!channel.is_active);
    }

    #[test]
    fn test_dedup_key_prefers_guid() {
        let entry = ParsedEntry {
            guid: Some("guid-1".to_string()),
            title: "Title".to_string(),
            ..Default::default()
        };
        assert_eq!(entry.dedup_key(), "guid-1");
    }

    #[test]
    fn test_dedup_key_falls_back_to_digest() {
        let entry = ParsedEntry {
            guid: Some("   ".to_string()),
            title: "Title".to_string(),
            link: Some("https://example.com/1".to_string()),
            ..Default::default()
        };
        let key = entry.dedup_key();
        assert_eq!(key.len(), 64);

        // Stable across calls, sensitive to the link
        assert_eq!(key, entry.dedup_key());
        let other = ParsedEntry {
            link: Some("https://example.com/2".to_string()),
            ..entry
        };
        assert_ne!(key, other.dedup_key());
    }

    #[test]
    fn test_new_feed_item_from_entry() {
        let entry = ParsedEntry {
            guid: Some("g".to_string()),
            title: "Article".to_string(),
            link: Some("https://example.com/a".to_string()),
            author: Some("Author".to_string()),
            ..Default::default()
        };
        let item = NewFeedItem::from_entry(5, &entry);
        assert_eq!(item.channel_id, 5);
        assert_eq!(item.feed_item_key, "g");
        assert_eq!(item.link, "https://example.com/a");
        assert_eq!(item.author, "Author");
        assert_eq!(item.description, "");
        assert!(item.publishing_date.is_none());
    }

    #[test]
    fn test_blacklist_item_validity() {
        assert!(BlacklistItem::new(1, "Spam").is_valid());
        assert!(!BlacklistItem::new(0, "Spam").is_valid());
        assert!(!BlacklistItem::new(-1, "Spam").is_valid());
        assert!(!BlacklistItem::new(1, "  ").is_valid());
        assert!(!BlacklistItem::new(1, "").is_valid());
    }
}
