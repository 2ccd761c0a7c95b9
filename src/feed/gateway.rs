//! Storage gateway for channels, feed items and blacklist entries.
//!
//! [`StorageGateway`] is the contract the sync engine consumes.
//! [`SqliteGateway`] implements it on top of the sqlx pool.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::normalize::{
    decode_engine, is_virtual_channel, normalize_publishing_date, normalize_refresh_interval,
};
use super::types::{
    BlacklistItem, Channel, CrawlerEngine, FeedItem, InsertOutcome, NewChannel, NewFeedItem,
};
use crate::config::RetentionConfig;
use crate::datetime::{parse_datetime, to_db_string};
use crate::db::DbPool;
use crate::{FeedmillError, Result};

/// Maximum rows bound in one batch statement.
pub const BATCH_CHUNK_SIZE: usize = 500;

/// Typed storage operations consumed by the sync engine.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Whether a channel already holds an item with this key.
    ///
    /// Always true for virtual channels, without touching storage.
    async fn check_exists(&self, channel_id: i64, feed_item_key: &str) -> Result<bool>;

    /// All keys recorded for a channel.
    async fn list_item_keys(&self, channel_id: i64) -> Result<HashSet<String>>;

    /// Every channel, for administrative listing.
    async fn list_all_channels(&self) -> Result<Vec<Channel>>;

    /// Channels taking part in scheduling.
    async fn list_active_channels(&self) -> Result<Vec<Channel>>;

    /// Insert an item; a key conflict is reported as [`InsertOutcome::Duplicate`].
    async fn insert_feed_item(&self, item: &NewFeedItem) -> Result<InsertOutcome>;

    /// Set the review flag on one item.
    async fn mark_checked(&self, id: i64, is_checked: bool) -> Result<bool>;

    /// Set the review flag on many items. An empty slice performs no write.
    async fn mark_checked_batch(&self, ids: &[i64], is_checked: bool) -> Result<u64>;

    /// Record a channel's health. No-op for virtual channels.
    async fn update_channel_error_status(
        &self,
        channel_id: i64,
        is_error: bool,
        message: &str,
    ) -> Result<bool>;

    /// Advance `last_updated_date` and clear the error state in one update.
    /// No-op for virtual channels.
    async fn mark_channel_refreshed(&self, channel_id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Set or clear a channel's crawler engine override.
    async fn update_channel_default_engine(
        &self,
        channel_id: i64,
        engine: Option<CrawlerEngine>,
    ) -> Result<bool>;

    /// Record one blacklist entry.
    async fn add_blacklist_item(
        &self,
        feed_item_id: i64,
        title: &str,
        delete_on_match: bool,
    ) -> Result<u64> {
        self.add_blacklist_items_batch(&[BlacklistItem::new(feed_item_id, title)], delete_on_match)
            .await
    }

    /// Record blacklist entries and delete or flag the referenced items.
    ///
    /// Entries with a non-positive ID or blank title are dropped first; if none
    /// remain, nothing is written. Returns the number of entries recorded.
    async fn add_blacklist_items_batch(
        &self,
        items: &[BlacklistItem],
        delete_on_match: bool,
    ) -> Result<u64>;

    /// Remove settled items beyond the retention policy. Returns rows deleted.
    async fn purge_stale_items(&self) -> Result<u64>;
}

/// Retention policy enforced by [`StorageGateway::purge_stale_items`].
///
/// Only checked items are ever removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Checked items ingested longer ago than this are removed.
    pub max_age_days: u32,
    /// Checked items beyond the newest N of a channel are removed.
    pub max_items_per_channel: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_age_days: config.max_age_days,
            max_items_per_channel: config.max_items_per_channel,
        }
    }
}

/// Settings handed to the gateway at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Retention policy.
    pub retention: RetentionPolicy,
}

/// Row type for a channel.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    title: String,
    link: String,
    description: String,
    language: String,
    copyright: String,
    image_url: String,
    original_document: String,
    crawler_engine: Option<i64>,
    refresh_time_minutes: Option<i64>,
    last_updated_date: Option<String>,
    channel_type: Option<i64>,
    is_active: bool,
    is_error: bool,
    error_message: String,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            title: row.title,
            link: row.link,
            description: row.description,
            language: row.language,
            copyright: row.copyright,
            image_url: row.image_url,
            original_document: row.original_document,
            crawler_engine: decode_engine(row.crawler_engine),
            refresh_interval_minutes: normalize_refresh_interval(row.refresh_time_minutes),
            last_updated_date: row.last_updated_date.as_deref().and_then(parse_datetime),
            channel_type: row.channel_type.and_then(|t| i32::try_from(t).ok()),
            is_active: row.is_active,
            is_error: row.is_error,
            error_message: row.error_message,
        }
    }
}

/// Row type for a feed item.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedItemRow {
    id: i64,
    channel_id: i64,
    feed_item_key: String,
    title: String,
    link: String,
    description: String,
    publishing_date: String,
    author: String,
    content: String,
    is_checked: bool,
    ingested_at: String,
}

impl From<FeedItemRow> for FeedItem {
    fn from(row: FeedItemRow) -> Self {
        let ingested_at = parse_datetime(&row.ingested_at).unwrap_or_else(Utc::now);
        FeedItem {
            id: row.id,
            channel_id: row.channel_id,
            feed_item_key: row.feed_item_key,
            title: row.title,
            link: row.link,
            description: row.description,
            publishing_date: normalize_publishing_date(
                parse_datetime(&row.publishing_date),
                ingested_at,
            ),
            author: row.author,
            content: row.content,
            is_checked: row.is_checked,
            ingested_at,
        }
    }
}

const CHANNEL_COLUMNS: &str = r#"
    id, title, link, description, language, copyright, image_url, original_document,
    crawler_engine, refresh_time_minutes, last_updated_date, channel_type,
    is_active, is_error, error_message
"#;

const FEED_ITEM_COLUMNS: &str = r#"
    id, channel_id, feed_item_key, title, link, description, publishing_date,
    author, content, is_checked, ingested_at
"#;

/// SQLite-backed storage gateway.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: DbPool,
    settings: GatewaySettings,
}

impl SqliteGateway {
    /// Create a gateway over an open pool.
    pub fn new(pool: DbPool, settings: GatewaySettings) -> Self {
        Self { pool, settings }
    }

    /// Register a channel. The link must not be blank.
    pub async fn create_channel(&self, channel: &NewChannel) -> Result<Channel> {
        if channel.link.trim().is_empty() {
            return Err(FeedmillError::Validation(
                "channel link is required".to_string(),
            ));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO channels (title, link, description, crawler_engine,
                                  refresh_time_minutes, channel_type, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&channel.title)
        .bind(&channel.link)
        .bind(&channel.description)
        .bind(channel.crawler_engine.map(CrawlerEngine::code))
        .bind(channel.refresh_interval_minutes)
        .bind(channel.channel_type)
        .bind(channel.is_active)
        .fetch_one(&self.pool)
        .await?;

        self.get_channel(id)
            .await?
            .ok_or_else(|| FeedmillError::Storage(format!("channel {id} vanished")))
    }

    /// Get a channel by ID.
    pub async fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        let query = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1");
        let row = sqlx::query_as::<_, ChannelRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Channel::from))
    }

    /// Get a feed item by ID.
    pub async fn get_feed_item(&self, id: i64) -> Result<Option<FeedItem>> {
        let query = format!("SELECT {FEED_ITEM_COLUMNS} FROM feed_items WHERE id = $1");
        let row = sqlx::query_as::<_, FeedItemRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(FeedItem::from))
    }

    /// List a channel's items, newest first.
    pub async fn list_items_by_channel(&self, channel_id: i64) -> Result<Vec<FeedItem>> {
        let query = format!(
            "SELECT {FEED_ITEM_COLUMNS} FROM feed_items
             WHERE channel_id = $1
             ORDER BY publishing_date DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, FeedItemRow>(&query)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(FeedItem::from).collect())
    }

    /// List all blacklist entries in insertion order.
    pub async fn list_blacklist_items(&self) -> Result<Vec<BlacklistItem>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT feed_item_id, title FROM blacklist_items ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(feed_item_id, title)| BlacklistItem::new(feed_item_id, title))
            .collect())
    }

    async fn list_channels(&self, active_only: bool) -> Result<Vec<Channel>> {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let query = format!("SELECT {CHANNEL_COLUMNS} FROM channels {filter} ORDER BY id ASC");
        let rows = sqlx::query_as::<_, ChannelRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }
}

/// Push `(id, id, ...)` for an `IN` clause.
fn push_id_list(query: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    query.push("(");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl StorageGateway for SqliteGateway {
    async fn check_exists(&self, channel_id: i64, feed_item_key: &str) -> Result<bool> {
        if is_virtual_channel(channel_id) {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM feed_items WHERE channel_id = $1 AND feed_item_key = $2)",
        )
        .bind(channel_id)
        .bind(feed_item_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_item_keys(&self, channel_id: i64) -> Result<HashSet<String>> {
        if is_virtual_channel(channel_id) {
            return Ok(HashSet::new());
        }

        let keys: Vec<String> =
            sqlx::query_scalar("SELECT feed_item_key FROM feed_items WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(keys.into_iter().collect())
    }

    async fn list_all_channels(&self) -> Result<Vec<Channel>> {
        self.list_channels(false).await
    }

    async fn list_active_channels(&self) -> Result<Vec<Channel>> {
        self.list_channels(true).await
    }

    async fn insert_feed_item(&self, item: &NewFeedItem) -> Result<InsertOutcome> {
        if is_virtual_channel(item.channel_id) {
            return Ok(InsertOutcome::Duplicate);
        }

        let now = Utc::now();
        let publishing_date = normalize_publishing_date(item.publishing_date, now);

        let result = sqlx::query(
            r#"
            INSERT INTO feed_items (channel_id, feed_item_key, title, link, description,
                                    publishing_date, author, content, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (channel_id, feed_item_key) DO NOTHING
            "#,
        )
        .bind(item.channel_id)
        .bind(&item.feed_item_key)
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.description)
        .bind(to_db_string(&publishing_date))
        .bind(&item.author)
        .bind(&item.content)
        .bind(to_db_string(&now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
        } else {
            debug!(
                "Key {} already stored for channel {}",
                item.feed_item_key, item.channel_id
            );
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn mark_checked(&self, id: i64, is_checked: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_items SET is_checked = $1 WHERE id = $2")
            .bind(is_checked)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_checked_batch(&self, ids: &[i64], is_checked: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for chunk in ids.chunks(BATCH_CHUNK_SIZE) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE feed_items SET is_checked = ");
            query.push_bind(is_checked);
            query.push(" WHERE id IN ");
            push_id_list(&mut query, chunk);
            affected += query.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(affected)
    }

    async fn update_channel_error_status(
        &self,
        channel_id: i64,
        is_error: bool,
        message: &str,
    ) -> Result<bool> {
        if is_virtual_channel(channel_id) {
            return Ok(false);
        }

        let result =
            sqlx::query("UPDATE channels SET is_error = $1, error_message = $2 WHERE id = $3")
                .bind(is_error)
                .bind(message)
                .bind(channel_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_channel_refreshed(&self, channel_id: i64, at: DateTime<Utc>) -> Result<bool> {
        if is_virtual_channel(channel_id) {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE channels
            SET last_updated_date = $1,
                is_error = 0,
                error_message = ''
            WHERE id = $2
            "#,
        )
        .bind(to_db_string(&at))
        .bind(channel_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_channel_default_engine(
        &self,
        channel_id: i64,
        engine: Option<CrawlerEngine>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE channels SET crawler_engine = $1 WHERE id = $2")
            .bind(engine.map(CrawlerEngine::code))
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_blacklist_items_batch(
        &self,
        items: &[BlacklistItem],
        delete_on_match: bool,
    ) -> Result<u64> {
        let valid: Vec<&BlacklistItem> = items.iter().filter(|item| item.is_valid()).collect();
        if valid.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in valid.chunks(BATCH_CHUNK_SIZE) {
            let mut insert: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO blacklist_items (feed_item_id, title) ");
            insert.push_values(chunk, |mut row, item| {
                row.push_bind(item.feed_item_id)
                    .push_bind(item.title.trim().to_string());
            });
            insert.build().execute(&mut *tx).await?;

            let ids: Vec<i64> = chunk.iter().map(|item| item.feed_item_id).collect();
            let mut apply: QueryBuilder<Sqlite> = if delete_on_match {
                QueryBuilder::new("DELETE FROM feed_items WHERE id IN ")
            } else {
                QueryBuilder::new("UPDATE feed_items SET is_checked = 1 WHERE id IN ")
            };
            push_id_list(&mut apply, &ids);
            apply.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(valid.len() as u64)
    }

    async fn purge_stale_items(&self) -> Result<u64> {
        let policy = self.settings.retention;
        // An age reaching past the representable range has no cutoff
        let cutoff = Duration::try_days(i64::from(policy.max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age));

        let mut tx = self.pool.begin().await?;

        let aged = match cutoff {
            Some(cutoff) => sqlx::query(
                "DELETE FROM feed_items WHERE is_checked = 1 AND ingested_at < $1",
            )
            .bind(to_db_string(&cutoff))
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            None => 0,
        };

        let capped = sqlx::query(
            r#"
            DELETE FROM feed_items
            WHERE is_checked = 1
              AND id IN (
                SELECT id FROM (
                    SELECT id,
                           ROW_NUMBER() OVER (
                               PARTITION BY channel_id
                               ORDER BY publishing_date DESC, id DESC
                           ) AS position
                    FROM feed_items
                )
                WHERE position > $1
              )
            "#,
        )
        .bind(i64::from(policy.max_items_per_channel))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        debug!("Purged {} aged and {} over-cap item(s)", aged, capped);
        Ok(aged + capped)
    }
}
