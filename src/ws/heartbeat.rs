//! Heartbeat monitor: periodic `ping` commands and round-trip measurement.
//!
//! The monitor holds no timer of its own. The connection worker owns the ticker returned by
//! [`HeartbeatMonitor::ticker`] inside its connected loop, so leaving `Connected` drops the
//! timer and stops the heartbeat.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::config::HeartbeatConfig;
use super::types::request::Command;

/// One measured heartbeat round trip.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSample {
    /// Wall-clock time the `ping` was sent
    pub sent_at: DateTime<Utc>,
    /// Time between sending the `ping` and receiving its `pong`
    pub rtt: Duration,
}

impl HeartbeatSample {
    #[must_use]
    pub fn rtt_ms(&self) -> u128 {
        self.rtt.as_millis()
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPing {
    timestamp: i64,
    sent_at: DateTime<Utc>,
    sent: Instant,
}

/// What the worker should do on a heartbeat tick.
#[derive(Debug)]
pub(crate) enum Tick {
    /// Send this `ping`
    Ping(Command),
    /// Too many consecutive pings went unanswered
    Expired { missed: u32 },
}

#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    max_missed_pongs: Option<u32>,
    outstanding: Option<PendingPing>,
    missed: u32,
}

impl HeartbeatMonitor {
    pub(crate) fn new(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval,
            max_missed_pongs: config.max_missed_pongs,
            outstanding: None,
            missed: 0,
        }
    }

    /// A ticker whose first tick fires one interval from now.
    pub(crate) fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    pub(crate) fn on_tick(&mut self) -> Tick {
        if self.outstanding.is_some() {
            self.missed = self.missed.saturating_add(1);
            if let Some(max) = self.max_missed_pongs
                && self.missed >= max
            {
                return Tick::Expired {
                    missed: self.missed,
                };
            }
        }

        let sent_at = Utc::now();
        let timestamp = sent_at.timestamp_millis();
        self.outstanding = Some(PendingPing {
            timestamp,
            sent_at,
            sent: Instant::now(),
        });

        Tick::Ping(Command::Ping { timestamp })
    }

    /// Match a `pong` against the outstanding `ping`.
    ///
    /// A pong that echoes a timestamp must echo the outstanding one; a pong without a
    /// timestamp answers whatever ping is outstanding.
    pub(crate) fn on_pong(&mut self, timestamp: Option<i64>) -> Option<HeartbeatSample> {
        let pending = self.outstanding?;
        if timestamp.is_some_and(|echoed| echoed != pending.timestamp) {
            return None;
        }

        self.outstanding = None;
        self.missed = 0;

        Some(HeartbeatSample {
            sent_at: pending.sent_at,
            rtt: pending.sent.elapsed(),
        })
    }

    pub(crate) fn reset(&mut self) {
        self.outstanding = None;
        self.missed = 0;
    }
}
