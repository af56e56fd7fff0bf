//! Feed pump configuration

use std::time::Duration;

/// Reconnection policy for the upstream feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Delay before the first reconnect attempt
    pub initial_backoff: Duration,

    /// Upper bound for the doubling backoff
    pub max_backoff: Duration,

    /// Give up after this many consecutive failed connects (None = never)
    pub max_connect_failures: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_connect_failures: None,
        }
    }
}

impl FeedConfig {
    /// Set the initial backoff
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the backoff ceiling
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Stop after `failures` consecutive connect errors
    pub fn max_connect_failures(mut self, failures: u32) -> Self {
        self.max_connect_failures = Some(failures);
        self
    }

    /// Backoff following `current`, doubled and capped
    pub(crate) fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = FeedConfig::default()
            .initial_backoff(Duration::from_millis(100))
            .max_backoff(Duration::from_millis(350));

        let b1 = config.next_backoff(config.initial_backoff);
        let b2 = config.next_backoff(b1);
        let b3 = config.next_backoff(b2);

        assert_eq!(b1, Duration::from_millis(200));
        assert_eq!(b2, Duration::from_millis(350));
        assert_eq!(b3, Duration::from_millis(350));
    }

    #[test]
    fn test_default_never_gives_up() {
        assert!(FeedConfig::default().max_connect_failures.is_none());
        assert_eq!(
            FeedConfig::default().max_connect_failures(3).max_connect_failures,
            Some(3)
        );
    }
}
