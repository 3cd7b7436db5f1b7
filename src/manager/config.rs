//! Manager configuration

use std::time::Duration;

use crate::stream::StreamIdentity;

/// Default bound on a single open attempt and on a close
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default registry lease (must match the registry's entry timeout)
pub const DEFAULT_ENTRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between two failed open attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Stream manager configuration options
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Bound on a single open attempt, and on each close
    pub timeout: Duration,

    /// Registry lease; targets are refreshed at this interval
    pub entry_timeout: Duration,

    /// Delay between two failed open attempts
    pub retry_delay: Duration,

    /// Lower bound of the random delay before a forced re-open
    pub jitter_min: Duration,

    /// Upper bound of the random delay before a forced re-open
    pub jitter_max: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            entry_timeout: DEFAULT_ENTRY_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(100),
        }
    }
}

impl ManagerConfig {
    /// Set the open/close timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the registry entry timeout
    pub fn entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout = timeout;
        self
    }

    /// Set the delay between open attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the forced re-open jitter range
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min.min(max);
        self.jitter_max = max.max(min);
        self
    }

    /// Draw a random delay within the jitter range
    pub(crate) fn draw_jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// A stream present in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredStream {
    /// Stream identity
    pub identity: StreamIdentity,

    /// Size of the identifier pool
    pub max_targets: u32,
}

impl ConfiguredStream {
    /// Create a new configured stream
    pub fn new(identity: StreamIdentity, max_targets: u32) -> Self {
        Self {
            identity,
            max_targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();

        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.entry_timeout, DEFAULT_ENTRY_TIMEOUT);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.jitter_min, Duration::from_millis(10));
        assert_eq!(config.jitter_max, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_chaining() {
        let config = ManagerConfig::default()
            .timeout(Duration::from_secs(5))
            .entry_timeout(Duration::from_secs(30))
            .retry_delay(Duration::from_millis(200));

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.entry_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_range() {
        // Bounds given in the wrong order are swapped
        let config =
            ManagerConfig::default().jitter(Duration::from_millis(50), Duration::from_millis(20));

        assert_eq!(config.jitter_min, Duration::from_millis(20));
        assert_eq!(config.jitter_max, Duration::from_millis(50));

        for _ in 0..100 {
            let jitter = config.draw_jitter();
            assert!(jitter >= Duration::from_millis(20));
            assert!(jitter <= Duration::from_millis(50));
        }
    }
}
