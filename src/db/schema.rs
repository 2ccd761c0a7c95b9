//! Database schema and migrations for feedmill.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded.

/// Database migrations.
///
/// Each migration is a SQL script executed in order. The schema_version table
/// tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Channels registry
    r#"
CREATE TABLE channels (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    title                 TEXT NOT NULL DEFAULT '',
    link                  TEXT NOT NULL DEFAULT '',
    description           TEXT NOT NULL DEFAULT '',
    language              TEXT NOT NULL DEFAULT '',
    copyright             TEXT NOT NULL DEFAULT '',
    image_url             TEXT NOT NULL DEFAULT '',
    original_document     TEXT NOT NULL DEFAULT '',
    crawler_engine        INTEGER,                   -- NULL = system default
    refresh_time_minutes  INTEGER,                   -- NULL or <= 0 = system default
    last_updated_date     TEXT,
    channel_type          INTEGER,
    is_active             INTEGER NOT NULL DEFAULT 1,
    is_error              INTEGER NOT NULL DEFAULT 0,
    error_message         TEXT NOT NULL DEFAULT '',
    created_at            TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_channels_is_active ON channels(is_active);
"#,
    // v2: Feed items, dedup key unique per channel
    r#"
CREATE TABLE feed_items (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id       INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    feed_item_key    TEXT NOT NULL,
    title            TEXT NOT NULL DEFAULT '',
    link             TEXT NOT NULL DEFAULT '',
    description      TEXT NOT NULL DEFAULT '',
    publishing_date  TEXT NOT NULL,
    author           TEXT NOT NULL DEFAULT '',
    content          TEXT NOT NULL DEFAULT '',
    is_checked       INTEGER NOT NULL DEFAULT 0,
    ingested_at      TEXT NOT NULL,
    UNIQUE (channel_id, feed_item_key)
);

CREATE INDEX idx_feed_items_channel_id ON feed_items(channel_id);
CREATE INDEX idx_feed_items_is_checked ON feed_items(is_checked);
"#,
    // v3: Blacklist entries (logical reference to feed_items, no FK)
    r#"
CREATE TABLE blacklist_items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_item_id  INTEGER NOT NULL,
    title         TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_blacklist_items_feed_item_id ON blacklist_items(feed_item_id);
"#,
];
