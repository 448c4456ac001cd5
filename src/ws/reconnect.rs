//! Reconnect scheduler: jitter-free exponential backoff with an attempt cap.

use std::time::Duration;

use backoff::backoff::Backoff;

use super::config::ReconnectConfig;

/// Decides whether and when to retry after an abnormal disconnection.
///
/// The k-th retry waits `min(base_delay * 2^(k-1), max_delay)`. Each call to
/// [`next_backoff`](Backoff::next_backoff) counts one attempt *before* it runs, so the first
/// retry is attempt 1. Once `max_attempts` retries have been handed out, `next_backoff`
/// returns `None` until [`reset`](Backoff::reset).
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectScheduler {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `true` once no further attempt will be admitted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Delay used for the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);

        self.config
            .base_delay
            .checked_mul(factor)
            .map_or(self.config.max_delay, |delay| delay.min(self.config.max_delay))
    }
}

impl Backoff for ReconnectScheduler {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempts = self.attempts.saturating_add(1);
        Some(self.delay_for(self.attempts))
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}
