//! Axis shaping: intent → bounded pedal axes.
//!
//! Digital input is rate limited (a key never jumps the actuator to full
//! scale); analog input is exponentially smoothed. Smoothing runs first and the
//! declared bounds are applied last, so a value leaving this module is always
//! in range.

use crate::config::{AxisLayout, ShapingSettings};
use crate::controller::device_adapter::{IntentSample, IntentSource};
use crate::network::message::AxisFrame;

/// Shaped pedal state carried from one tick to the next.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisState {
    /// Combined layout: signed axis, positive accelerates
    pub value: f64,
    /// Split layout: accelerator
    pub accel: f64,
    /// Split layout: brake
    pub brake: f64,
}

/// Axis bar fill derived from the shaped value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisDisplay {
    pub forward_pct: f64,
    pub reverse_pct: f64,
    pub readout: i32,
}

#[derive(Debug, Clone)]
pub struct AxisShaper {
    settings: ShapingSettings,
}

impl AxisShaper {
    pub fn new(settings: ShapingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ShapingSettings {
        &self.settings
    }

    /// Advances the shaped axes by `dt_seconds` towards the given intent.
    pub fn advance(&self, intent: &IntentSample, dt_seconds: f64, prior: AxisState) -> AxisState {
        let dt = if dt_seconds.is_finite() {
            dt_seconds.max(0.0)
        } else {
            0.0
        };
        let s = &self.settings;

        let next = match (intent.source, s.layout) {
            (IntentSource::Keys, AxisLayout::Combined) => {
                let up = intent.throttle > 0.0 && intent.brake == 0.0;
                let down = intent.brake > 0.0 && intent.throttle == 0.0;
                let value = if up {
                    prior.value + s.slew_up_per_s * dt
                } else if down {
                    prior.value - s.slew_down_per_s * dt
                } else {
                    decay_toward_zero(prior.value, s.release_rate_per_s * dt)
                };
                AxisState { value, ..prior }
            }
            (IntentSource::Keys, AxisLayout::Split) => {
                let accel = if intent.throttle > 0.0 {
                    prior.accel + s.accel_rate_per_s * dt
                } else {
                    decay_toward_zero(prior.accel, s.release_rate_per_s * dt)
                };
                let brake = if intent.brake > 0.0 {
                    prior.brake + s.brake_rate_per_s * dt
                } else {
                    decay_toward_zero(prior.brake, s.release_rate_per_s * dt)
                };
                AxisState {
                    accel,
                    brake,
                    ..prior
                }
            }
            (IntentSource::Analog, AxisLayout::Combined) => {
                let target = intent.throttle * s.axis_max + intent.brake * s.axis_min;
                AxisState {
                    value: self.smooth(prior.value, target, dt),
                    ..prior
                }
            }
            (IntentSource::Analog, AxisLayout::Split) => AxisState {
                accel: self.smooth(prior.accel, intent.throttle * s.axis_max, dt),
                brake: self.smooth(prior.brake, intent.brake * s.axis_max, dt),
                ..prior
            },
        };

        self.clamp(next)
    }

    fn smooth(&self, value: f64, target: f64, dt: f64) -> f64 {
        let tau = self.settings.smoothing_tau_ms / 1000.0;
        let alpha = 1.0 - (-dt / tau).exp();
        value + (target - value) * alpha
    }

    fn clamp(&self, state: AxisState) -> AxisState {
        let s = &self.settings;
        AxisState {
            value: state.value.clamp(s.axis_min, s.axis_max),
            accel: state.accel.clamp(0.0, s.axis_max),
            brake: state.brake.clamp(0.0, s.axis_max),
        }
    }

    /// Integer wire values for the configured layout, clamped again after rounding.
    pub fn frame(&self, state: &AxisState) -> AxisFrame {
        let s = &self.settings;
        let state = self.clamp(*state);
        match s.layout {
            AxisLayout::Combined => AxisFrame::Combined(round_axis(state.value)),
            AxisLayout::Split => AxisFrame::Split {
                accel: round_axis(state.accel),
                brake: round_axis(state.brake),
            },
        }
    }

    /// Axis bar fill; the dead-zone here never touches the transmitted value.
    pub fn display(&self, state: &AxisState) -> AxisDisplay {
        let s = &self.settings;
        let dz = s.display_deadzone;
        let state = self.clamp(*state);
        let (forward, reverse, readout) = match s.layout {
            AxisLayout::Combined => (
                state.value.max(0.0),
                (-state.value).max(0.0),
                round_axis(state.value),
            ),
            AxisLayout::Split => (
                state.accel,
                state.brake,
                round_axis(state.accel - state.brake),
            ),
        };
        let reverse_bound = match s.layout {
            AxisLayout::Combined => -s.axis_min,
            AxisLayout::Split => s.axis_max,
        };
        AxisDisplay {
            forward_pct: fill_pct(forward, dz, s.axis_max),
            reverse_pct: fill_pct(reverse, dz, reverse_bound),
            readout,
        }
    }
}

fn decay_toward_zero(value: f64, step: f64) -> f64 {
    if value.abs() <= step {
        0.0
    } else {
        value - step * value.signum()
    }
}

fn round_axis(value: f64) -> i32 {
    value.round() as i32
}

fn fill_pct(magnitude: f64, deadzone: f64, bound: f64) -> f64 {
    let range = bound - deadzone;
    if magnitude <= deadzone || range <= 0.0 {
        0.0
    } else {
        ((magnitude - deadzone) / range * 100.0).min(100.0)
    }
}
