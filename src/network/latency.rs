//! Round-trip measurement over the command channel.
//!
//! The console sends `{"ping": <ms>}` with a monotonic timestamp and the remote
//! echoes it as `{"pong": <ms>}`. The timestamps are milliseconds since the
//! channel's epoch, so wall-clock jumps never produce negative round trips.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBand {
    Good,
    Warn,
    Bad,
}

impl LatencyBand {
    pub fn classify(rtt_ms: f64) -> Self {
        if rtt_ms < 80.0 {
            LatencyBand::Good
        } else if rtt_ms < 200.0 {
            LatencyBand::Warn
        } else {
            LatencyBand::Bad
        }
    }
}

impl fmt::Display for LatencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyBand::Good => write!(f, "good"),
            LatencyBand::Warn => write!(f, "warn"),
            LatencyBand::Bad => write!(f, "bad"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub rtt_ms: f64,
    pub band: LatencyBand,
}

impl LatencySample {
    pub fn from_rtt(rtt_ms: f64) -> Self {
        Self {
            rtt_ms,
            band: LatencyBand::classify(rtt_ms),
        }
    }
}

/// Probe schedule; armed while connected.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    epoch: Instant,
    interval: Duration,
    next_due: Option<Instant>,
}

impl LatencyProbe {
    pub fn new(epoch: Instant, interval: Duration) -> Self {
        Self {
            epoch,
            interval,
            next_due: None,
        }
    }

    /// Monotonic milliseconds since the epoch.
    pub fn stamp(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.epoch).as_secs_f64() * 1000.0
    }

    /// First probe goes out on the next poll.
    pub fn arm(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    /// Returns the stamp to send when a probe is due.
    pub fn poll(&mut self, now: Instant) -> Option<f64> {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                Some(self.stamp(now))
            }
            _ => None,
        }
    }

    /// Turns an echoed stamp into a sample; stamps from the future are rejected.
    pub fn on_pong(&self, pong: f64, now: Instant) -> Option<LatencySample> {
        let rtt = self.stamp(now) - pong;
        if pong.is_finite() && rtt >= 0.0 {
            Some(LatencySample::from_rtt(rtt))
        } else {
            None
        }
    }
}
