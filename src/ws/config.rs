#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_CLOSE_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_BASE_DELAY_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Configuration for a single stream connection.
///
/// Every connection opened by a [`Registry`](crate::ws::Registry) shares the registry's
/// configuration unless it is opened with [`Registry::open_with`](crate::ws::Registry::open_with).
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// How long to wait for the transport to signal open before counting the attempt as failed
    #[builder(default = DEFAULT_CONNECT_TIMEOUT_DURATION)]
    pub connect_timeout: Duration,
    /// How long an explicit disconnect waits for the transport to confirm the close
    #[builder(default = DEFAULT_CLOSE_TIMEOUT_DURATION)]
    pub close_timeout: Duration,
    /// Heartbeat (PING/PONG) configuration
    #[builder(default)]
    pub heartbeat: HeartbeatConfig,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Outbound queue configuration
    #[builder(default)]
    pub queue: QueueConfig,
    /// Re-send delivered `subscribe` commands after every reconnection
    #[builder(default = true)]
    pub resubscribe_on_reconnect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
            close_timeout: DEFAULT_CLOSE_TIMEOUT_DURATION,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            queue: QueueConfig::default(),
            resubscribe_on_reconnect: true,
        }
    }
}

/// Configuration for the heartbeat monitor.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct HeartbeatConfig {
    /// Interval for sending `ping` commands while connected
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub interval: Duration,
    /// Consecutive unanswered pings after which the connection is forcibly recycled.
    /// `None` keeps the monitor purely observational.
    pub max_missed_pongs: Option<u32>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            max_missed_pongs: None,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt, doubled for each following one
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl ReconnectConfig {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            base_delay: DEFAULT_BASE_DELAY_DURATION,
            max_delay: DEFAULT_MAX_DELAY_DURATION,
        }
    }
}

/// Configuration for the outbound queue used while disconnected.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct QueueConfig {
    /// Maximum number of queued commands; the oldest is dropped on overflow
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heartbeat_is_thirty_seconds() {
        let config = Config::default();
        assert_eq!(config.heartbeat.interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat.max_missed_pongs, None);
    }

    #[test]
    fn default_reconnect_policy() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn builder_matches_default() {
        let built = Config::builder().build();
        let default = Config::default();

        assert_eq!(built.connect_timeout, default.connect_timeout);
        assert_eq!(built.close_timeout, default.close_timeout);
        assert_eq!(built.queue.capacity, default.queue.capacity);
        assert_eq!(built.reconnect.max_attempts, default.reconnect.max_attempts);
        assert!(built.resubscribe_on_reconnect);
    }

    #[test]
    fn builder_overrides_max_attempts() {
        let config = Config::builder()
            .reconnect(ReconnectConfig::default().with_max_attempts(Some(10)))
            .build();

        assert_eq!(config.reconnect.max_attempts, Some(10));
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(1));
    }
}
