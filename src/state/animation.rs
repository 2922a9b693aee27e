//! Engine-start gauge sweep.
//!
//! A phase machine driven only by elapsed time. While a sweep is running its
//! frames replace the reconciled rpm and speed on the instruments; once it
//! completes (or is cancelled) the display goes back to the reconciled values.
//!
//! ```text
//! Idle ─start()─► Rising ─► Holding ─► Falling ─► Idle
//!                    └──────────┴──────────┴─cancel()─► Idle
//! ```

use crate::config::AnimationSettings;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepPhase {
    #[default]
    Idle,
    Rising,
    Holding,
    Falling,
}

/// Phase and time spent in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepAnimationState {
    pub phase: SweepPhase,
    pub elapsed: Duration,
}

/// Gauge override for one frame, both values normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepFrame {
    pub rpm_norm: f64,
    pub speed_frac: f64,
}

pub fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[derive(Debug, Clone)]
pub struct AnimationController {
    rising: Duration,
    holding: Duration,
    falling: Duration,
    idle_rpm_norm: f64,
    state: SweepAnimationState,
}

impl AnimationController {
    /// `idle_rpm_norm` is the rpm baseline the fall phase settles on.
    pub fn new(settings: &AnimationSettings, idle_rpm_norm: f64) -> Self {
        Self {
            rising: Duration::from_millis(settings.rising_ms),
            holding: Duration::from_millis(settings.holding_ms),
            falling: Duration::from_millis(settings.falling_ms),
            idle_rpm_norm: idle_rpm_norm.clamp(0.0, 1.0),
            state: SweepAnimationState::default(),
        }
    }

    pub fn state(&self) -> SweepAnimationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.phase != SweepPhase::Idle
    }

    /// Total length of an uninterrupted sweep.
    pub fn duration(&self) -> Duration {
        self.rising + self.holding + self.falling
    }

    /// Starts (or restarts) the sweep from the bottom.
    pub fn start(&mut self) {
        debug!("Sweep started");
        self.state = SweepAnimationState {
            phase: SweepPhase::Rising,
            elapsed: Duration::ZERO,
        };
    }

    /// Drops straight to Idle; the fall phase is skipped.
    pub fn cancel(&mut self) {
        if self.is_active() {
            debug!("Sweep cancelled in {:?}", self.state.phase);
        }
        self.state = SweepAnimationState::default();
    }

    /// Advances by `dt` and returns the override for this frame, or `None`
    /// when no sweep is running (including the frame on which it completes).
    pub fn advance(&mut self, dt: Duration) -> Option<SweepFrame> {
        if !self.is_active() {
            return None;
        }
        self.state.elapsed += dt;

        loop {
            let elapsed = self.state.elapsed;
            match self.state.phase {
                SweepPhase::Idle => return None,
                SweepPhase::Rising => {
                    if elapsed >= self.rising {
                        self.enter(SweepPhase::Holding, elapsed - self.rising);
                        continue;
                    }
                    let k = ease_in_out(fraction(elapsed, self.rising));
                    return Some(SweepFrame {
                        rpm_norm: k,
                        speed_frac: k,
                    });
                }
                SweepPhase::Holding => {
                    if elapsed >= self.holding {
                        self.enter(SweepPhase::Falling, elapsed - self.holding);
                        continue;
                    }
                    return Some(SweepFrame {
                        rpm_norm: 1.0,
                        speed_frac: 1.0,
                    });
                }
                SweepPhase::Falling => {
                    if elapsed >= self.falling {
                        debug!("Sweep complete");
                        self.state = SweepAnimationState::default();
                        return None;
                    }
                    let k = ease_in_out(fraction(elapsed, self.falling));
                    return Some(SweepFrame {
                        rpm_norm: 1.0 + (self.idle_rpm_norm - 1.0) * k,
                        speed_frac: 1.0 - k,
                    });
                }
            }
        }
    }

    fn enter(&mut self, phase: SweepPhase, carry: Duration) {
        self.state = SweepAnimationState {
            phase,
            elapsed: carry,
        };
    }
}

fn fraction(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        1.0
    } else {
        elapsed.as_secs_f64() / total.as_secs_f64()
    }
}
