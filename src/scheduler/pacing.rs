use std::time::{Duration, Instant};

/// Minimum spacing between two outbound axis frames.
///
/// Frames are produced every tick but only the latest one is sent when the
/// interval has passed; anything in between is simply superseded.
#[derive(Debug, Clone)]
pub struct SendPacer {
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl SendPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    pub fn should_send(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }

    /// Next frame goes out immediately.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
