//! Per-channel cycle leases.

use std::sync::Arc;

use dashmap::DashSet;

/// Set of channels with a cycle in flight.
#[derive(Debug, Clone, Default)]
pub struct ChannelLocks {
    held: Arc<DashSet<i64>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for a channel, or `None` if a cycle already holds it.
    pub fn try_acquire(&self, channel_id: i64) -> Option<ChannelLease> {
        self.held.insert(channel_id).then(|| ChannelLease {
            channel_id,
            held: Arc::clone(&self.held),
        })
    }

    /// Whether a channel is currently leased.
    pub fn is_held(&self, channel_id: i64) -> bool {
        self.held.contains(&channel_id)
    }
}

/// Held lease; released on drop.
#[derive(Debug)]
pub struct ChannelLease {
    channel_id: i64,
    held: Arc<DashSet<i64>>,
}

impl ChannelLease {
    pub fn channel_id(&self) -> i64 {
        self.channel_id
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.held.remove(&self.channel_id);
    }
}
