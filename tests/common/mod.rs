//! Test helpers for integration tests.
//!
//! Provides an in-memory gateway, a scripted crawler and an ingestor builder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feedmill::feed::{GatewaySettings, RetentionPolicy, SqliteGateway};
use feedmill::{
    BlacklistFilter, Channel, ChannelScheduler, CrawlerEngine, CrawlerRegistry, Database,
    FeedCrawler, FeedmillError, IngestSettings, Ingestor, NewChannel, ParsedEntry, Result,
};

/// Default refresh interval used by test schedulers.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 60;

/// What a scripted crawler returns for one link.
#[derive(Debug, Clone)]
pub enum Script {
    Entries(Vec<ParsedEntry>),
    Fail(String),
    Delayed(Duration, Vec<ParsedEntry>),
    Panic,
}

/// Crawler returning canned responses keyed by channel link.
///
/// Links without a script return no entries.
#[derive(Debug, Default)]
pub struct ScriptedCrawler {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCrawler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, link: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(link.to_string(), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedCrawler for ScriptedCrawler {
    async fn fetch(&self, channel: &Channel) -> Result<Vec<ParsedEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self.scripts.lock().unwrap().get(&channel.link).cloned();
        match script {
            None => Ok(Vec::new()),
            Some(Script::Entries(entries)) => Ok(entries),
            Some(Script::Fail(message)) => Err(FeedmillError::Fetch(message)),
            Some(Script::Delayed(delay, entries)) => {
                tokio::time::sleep(delay).await;
                Ok(entries)
            }
            Some(Script::Panic) => panic!("scripted crawler panic for {}", channel.link),
        }
    }
}

/// Open an in-memory database and a gateway over it.
pub async fn setup() -> (Database, Arc<SqliteGateway>) {
    setup_with_retention(RetentionPolicy::default()).await
}

/// Open an in-memory database with a custom retention policy.
pub async fn setup_with_retention(retention: RetentionPolicy) -> (Database, Arc<SqliteGateway>) {
    let db = Database::open_in_memory().await.unwrap();
    let gateway = Arc::new(SqliteGateway::new(
        db.pool().clone(),
        GatewaySettings { retention },
    ));
    (db, gateway)
}

/// Feed link used for a named test channel.
pub fn link(name: &str) -> String {
    format!("https://feeds.example.com/{name}.xml")
}

/// Create an active channel using the default engine.
pub async fn create_channel(gateway: &SqliteGateway, name: &str) -> Channel {
    gateway
        .create_channel(&NewChannel::new(name, link(name)))
        .await
        .unwrap()
}

/// Parsed entry with a guid.
pub fn entry(guid: &str, title: &str) -> ParsedEntry {
    ParsedEntry {
        guid: Some(guid.to_string()),
        title: title.to_string(),
        link: Some(format!("https://example.com/articles/{guid}")),
        ..Default::default()
    }
}

/// Parsed entry with an explicit publishing date.
pub fn dated_entry(guid: &str, title: &str, published_at: DateTime<Utc>) -> ParsedEntry {
    ParsedEntry {
        published_at: Some(published_at),
        ..entry(guid, title)
    }
}

/// Ingest settings suitable for tests.
pub fn test_settings() -> IngestSettings {
    IngestSettings {
        fetch_timeout: Duration::from_secs(5),
        ..IngestSettings::default()
    }
}

/// Build an ingestor using the scripted crawler for every engine.
pub fn ingestor(
    gateway: Arc<SqliteGateway>,
    crawler: Arc<ScriptedCrawler>,
    blacklist: BlacklistFilter,
    settings: IngestSettings,
) -> Ingestor {
    let registry = CrawlerRegistry::new(CrawlerEngine::FeedRs)
        .with_crawler(CrawlerEngine::FeedRs, crawler.clone())
        .with_crawler(CrawlerEngine::Rss, crawler);

    Ingestor::new(
        gateway,
        registry,
        blacklist,
        ChannelScheduler::new(chrono::Duration::minutes(DEFAULT_INTERVAL_MINUTES)),
        settings,
    )
}

/// Build an ingestor with no blacklist and test settings.
pub fn default_ingestor(gateway: Arc<SqliteGateway>, crawler: Arc<ScriptedCrawler>) -> Ingestor {
    ingestor(gateway, crawler, BlacklistFilter::default(), test_settings())
}
