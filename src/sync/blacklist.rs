//! Title blacklist filter.

use tracing::info;

use crate::config::BlacklistConfig;
use crate::feed::{BlacklistItem, StorageGateway};
use crate::Result;

/// Matches item titles against configured patterns.
///
/// A pattern matches when the title contains it, ignoring case and
/// surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    patterns: Vec<String>,
    delete_on_match: bool,
}

impl BlacklistFilter {
    /// Build a filter. Blank patterns are dropped.
    pub fn new<I, S>(patterns: I, delete_on_match: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            patterns,
            delete_on_match,
        }
    }

    /// Build a filter from configuration.
    pub fn from_config(config: &BlacklistConfig) -> Self {
        Self::new(&config.patterns, config.delete_on_match)
    }

    /// Whether no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether matching items are deleted rather than flagged.
    pub fn delete_on_match(&self) -> bool {
        self.delete_on_match
    }

    /// Whether a title matches any pattern.
    pub fn matches(&self, title: &str) -> bool {
        let title = title.trim().to_lowercase();
        !title.is_empty() && self.patterns.iter().any(|p| title.contains(p.as_str()))
    }

    /// Keep the candidates whose title matches.
    ///
    /// Candidates with a non-positive ID or blank title are skipped.
    pub fn select(&self, candidates: &[BlacklistItem]) -> Vec<BlacklistItem> {
        candidates
            .iter()
            .filter(|entry| entry.is_valid() && self.matches(&entry.title))
            .map(|entry| BlacklistItem::new(entry.feed_item_id, entry.title.trim()))
            .collect()
    }

    /// Evaluate candidates and record matches in one batch.
    ///
    /// Returns the number of entries recorded. No write is issued when
    /// nothing matches.
    pub async fn evaluate<G>(&self, gateway: &G, candidates: &[BlacklistItem]) -> Result<u64>
    where
        G: StorageGateway + ?Sized,
    {
        if self.is_empty() {
            return Ok(0);
        }

        let matched = self.select(candidates);
        if matched.is_empty() {
            return Ok(0);
        }

        let written = gateway
            .add_blacklist_items_batch(&matched, self.delete_on_match)
            .await?;
        info!(
            "Blacklisted {} item(s) ({})",
            written,
            if self.delete_on_match { "deleted" } else { "flagged" }
        );
        Ok(written)
    }
}
