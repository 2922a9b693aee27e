use std::time::Duration;

/// Reconnect delay for the `attempt`-th consecutive failure (0-based).
///
/// `initial * 2^attempt`, saturating at `max`.
pub fn delay_for_attempt(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Exponential reconnect delay with a cap, reset on every successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay the next retry would wait, without consuming it.
    pub fn current(&self) -> Duration {
        delay_for_attempt(self.initial, self.max, self.attempt)
    }

    /// Delay for this retry; the following one will be twice as long (capped).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        if delay < self.max {
            self.attempt += 1;
        }
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
