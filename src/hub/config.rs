//! Hub configuration

use std::time::Duration;

/// Configuration for a [`BroadcastHub`](super::BroadcastHub)
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_subscribers: usize,

    /// Capacity of each session's delivery queue (minimum 1)
    pub queue_capacity: usize,

    /// A session with pending records and no delivery for this long is
    /// considered stalled and removed by the sweeper
    pub stall_timeout: Duration,

    /// How often the sweeper runs
    pub sweep_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subscribers: 256,
            queue_capacity: 64,
            stall_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    /// Set maximum subscribers
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    /// Set per-session queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set stall timeout
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Check whether a set of `current` subscribers is full
    pub(crate) fn is_full(&self, current: usize) -> bool {
        self.max_subscribers > 0 && current >= self.max_subscribers
    }
}
