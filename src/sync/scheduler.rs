//! Channel scheduler.
//!
//! Decides which channels are due for a refresh cycle. Purely a function of
//! the channel snapshot and the clock.

use chrono::{DateTime, Duration, Utc};

use crate::feed::Channel;

/// Decides which channels are due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelScheduler {
    default_interval: Duration,
}

impl ChannelScheduler {
    /// Create a scheduler with the interval used by channels without their own.
    pub fn new(default_interval: Duration) -> Self {
        Self { default_interval }
    }

    /// Interval applied to a channel.
    pub fn effective_interval(&self, channel: &Channel) -> Duration {
        channel
            .refresh_interval_minutes
            .map(|minutes| Duration::minutes(i64::from(minutes)))
            .unwrap_or(self.default_interval)
    }

    /// Whether a channel is due at `now`.
    ///
    /// Virtual and inactive channels are never due. A channel that was never
    /// refreshed is always due.
    pub fn is_due(&self, channel: &Channel, now: DateTime<Utc>) -> bool {
        if channel.is_virtual() || !channel.is_active {
            return false;
        }

        match channel.last_updated_date {
            None => true,
            Some(last) => now - last >= self.effective_interval(channel),
        }
    }

    /// Select the due channels, never-refreshed first, then oldest first.
    pub fn due_channels(&self, channels: Vec<Channel>, now: DateTime<Utc>) -> Vec<Channel> {
        let mut due: Vec<Channel> = channels
            .into_iter()
            .filter(|channel| self.is_due(channel, now))
            .collect();
        // None sorts before Some
        due.sort_by_key(|channel| (channel.last_updated_date, channel.id));
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn channel(id: i64, interval: Option<u32>, last: Option<DateTime<Utc>>) -> Channel {
        Channel {
            id,
            is_active: true,
            refresh_interval_minutes: interval,
            last_updated_date: last,
            ..Channel::virtual_channel(format!("https://example.com/{id}"))
        }
    }

    fn scheduler() -> ChannelScheduler {
        ChannelScheduler::new(Duration::minutes(60))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_never_refreshed_is_due() {
        assert!(scheduler().is_due(&channel(1, Some(30), None), t0()));
    }

    #[test]
    fn test_virtual_channel_is_never_due() {
        assert!(!scheduler().is_due(&channel(0, None, None), t0()));
        assert!(!scheduler().is_due(&channel(-4, Some(1), None), t0()));
    }

    #[test]
    fn test_inactive_channel_is_never_due() {
        let mut inactive = channel(1, None, None);
        inactive.is_active = false;
        assert!(!scheduler().is_due(&inactive, t0()));
    }

    #[test]
    fn test_own_interval() {
        let c = channel(1, Some(30), Some(t0()));
        assert!(!scheduler().is_due(&c, t0() + Duration::minutes(29)));
        assert!(scheduler().is_due(&c, t0() + Duration::minutes(30)));
    }

    #[test]
    fn test_absent_interval_uses_default() {
        let c = channel(1, None, Some(t0()));
        assert_eq!(scheduler().effective_interval(&c), Duration::minutes(60));
        assert!(!scheduler().is_due(&c, t0() + Duration::minutes(59)));
        assert!(scheduler().is_due(&c, t0() + Duration::minutes(60)));
    }

    #[test]
    fn test_due_is_monotonic_in_time() {
        let s = scheduler();
        let c = channel(1, Some(45), Some(t0()));
        let mut became_due = false;
        for minute in 0..180 {
            let due = s.is_due(&c, t0() + Duration::minutes(minute));
            // Once due, stays due until refreshed
            assert!(!(became_due && !due), "due flipped back at minute {minute}");
            became_due |= due;
        }
        assert!(became_due);
    }

    #[test]
    fn test_due_channels_ordering() {
        let now = t0();
        let channels = vec![
            channel(1, Some(10), Some(now - Duration::minutes(20))),
            channel(2, Some(10), None),
            channel(3, Some(10), Some(now - Duration::minutes(90))),
            channel(4, Some(10), Some(now - Duration::minutes(5))),
            channel(0, None, None),
        ];

        let ids: Vec<i64> = scheduler()
            .due_channels(channels, now)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
