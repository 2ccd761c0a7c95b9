//! Per-cycle dedup index.

use std::collections::HashSet;

use crate::feed::normalize::is_virtual_channel;
use crate::feed::StorageGateway;
use crate::Result;

/// Answers "has this channel already stored this key?" for one cycle.
///
/// When warmed, the channel's keys are loaded once and consulted in memory;
/// otherwise every lookup goes to the gateway. An index is never reused
/// across cycles.
#[derive(Debug)]
pub struct DedupIndex {
    channel_id: i64,
    keys: Option<HashSet<String>>,
}

impl DedupIndex {
    /// Open an index for a channel, optionally warming it from storage.
    pub async fn open<G>(gateway: &G, channel_id: i64, warm: bool) -> Result<Self>
    where
        G: StorageGateway + ?Sized,
    {
        let keys = if warm && !is_virtual_channel(channel_id) {
            Some(gateway.list_item_keys(channel_id).await?)
        } else {
            None
        };

        Ok(Self { channel_id, keys })
    }

    /// Whether the key is already present. Always true for virtual channels.
    pub async fn exists<G>(&self, gateway: &G, key: &str) -> Result<bool>
    where
        G: StorageGateway + ?Sized,
    {
        if is_virtual_channel(self.channel_id) {
            return Ok(true);
        }

        match &self.keys {
            Some(keys) => Ok(keys.contains(key)),
            None => gateway.check_exists(self.channel_id, key).await,
        }
    }

    /// Remember a key stored during this cycle.
    pub fn record(&mut self, key: &str) {
        if let Some(keys) = self.keys.as_mut() {
            keys.insert(key.to_string());
        }
    }

    /// Whether the index holds an in-memory key set.
    pub fn is_warm(&self) -> bool {
        self.keys.is_some()
    }
}
