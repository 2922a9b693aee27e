//! Device Adapter - normalizes keys and analog devices into driving intent
//!
//! The adapter is polled once per scheduler tick and turns whatever input is
//! current into an [`IntentSample`]:
//!
//! ```text
//! KeyState ───────────────┐
//!                         ├──► DeviceAdapter ──► IntentSample {throttle, brake, steer}
//! DeviceSnapshot ─► link ─┘        │
//!                  (calibration)   └──► ControlAction (button edges)
//! ```
//!
//! # Pedal calibration
//!
//! Pedal axes report their rest position with a device-specific polarity
//! (some rest at -1, some at +1, some at 0). Instead of guessing from
//! thresholds, the adapter records the rest reading over the first few polls
//! after a device attaches and orients every later reading relative to it:
//! travel runs from the rest value towards the farther extreme. A device whose
//! rest readings are not stable, or which lacks a configured axis, is treated
//! as disconnected until it is re-attached.

use crate::config::DeviceSettings;
use crate::controller::device::{buttons, ControlAction, DeviceSnapshot, KeyState};
use crate::network::message::{Gear, Toggle};
use tracing::{debug, info, warn};

/// Where an intent sample came from; selects the shaping mode downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntentSource {
    #[default]
    Keys,
    Analog,
}

/// Canonical driving intent for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntentSample {
    /// Accelerator intent in [0, 1]
    pub throttle: f64,
    /// Brake intent in [0, 1]
    pub brake: f64,
    /// Steering intent in [-1, 1], negative is left
    pub steer: f64,
    pub source: IntentSource,
}

impl IntentSample {
    pub fn from_keys(keys: &KeyState) -> Self {
        let steer = match (keys.steer_left, keys.steer_right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        Self {
            throttle: if keys.throttle { 1.0 } else { 0.0 },
            brake: if keys.brake { 1.0 } else { 0.0 },
            steer,
            source: IntentSource::Keys,
        }
    }

    pub fn is_steering(&self) -> bool {
        self.steer != 0.0
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("Device has no axis {0}")]
    MissingAxis(usize),

    #[error("Rest reading of axis {axis} is unstable (spread {spread:.3})")]
    Unstable { axis: usize, spread: f64 },

    #[error("No rest samples collected")]
    NoSamples,
}

/// Rest-relative orientation of one pedal axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedalCalibration {
    rest: f64,
    direction: f64,
    travel: f64,
}

impl PedalCalibration {
    /// Establishes the released position from readings taken while the pedal is at rest.
    pub fn from_rest_samples(
        axis: usize,
        samples: &[f64],
        tolerance: f64,
    ) -> Result<Self, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::NoSamples);
        }
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = max - min;
        if spread > tolerance {
            return Err(CalibrationError::Unstable { axis, spread });
        }

        let rest = (samples.iter().sum::<f64>() / samples.len() as f64).clamp(-1.0, 1.0);
        // Travel heads for whichever extreme is farther from rest
        let (direction, travel) = if rest <= 0.0 {
            (1.0, 1.0 - rest)
        } else {
            (-1.0, 1.0 + rest)
        };

        Ok(Self {
            rest,
            direction,
            travel,
        })
    }

    pub fn rest(&self) -> f64 {
        self.rest
    }

    /// Pressed fraction in [0, 1] for a raw reading.
    pub fn pressed(&self, raw: f64) -> f64 {
        ((raw - self.rest) * self.direction / self.travel).clamp(0.0, 1.0)
    }
}

/// Calibration progress of the currently attached device.
#[derive(Debug, Clone, PartialEq)]
enum DeviceLink {
    Absent,
    Calibrating {
        attach_id: u64,
        throttle: Vec<f64>,
        brake: Vec<f64>,
    },
    Ready {
        attach_id: u64,
        throttle: PedalCalibration,
        brake: PedalCalibration,
    },
    Rejected {
        attach_id: u64,
    },
}

/// What the rest of the console needs to know about the analog device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceStatus {
    #[default]
    Absent,
    Calibrating,
    Ready,
    Rejected,
}

pub struct DeviceAdapter {
    settings: DeviceSettings,
    link: DeviceLink,
    last_buttons: Vec<bool>,
}

impl DeviceAdapter {
    pub fn new(settings: DeviceSettings) -> Self {
        debug!("Creating DeviceAdapter with settings: {:?}", settings);
        Self {
            settings,
            link: DeviceLink::Absent,
            last_buttons: Vec::new(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        match self.link {
            DeviceLink::Absent => DeviceStatus::Absent,
            DeviceLink::Calibrating { .. } => DeviceStatus::Calibrating,
            DeviceLink::Ready { .. } => DeviceStatus::Ready,
            DeviceLink::Rejected { .. } => DeviceStatus::Rejected,
        }
    }

    /// Produces this tick's intent. Held keys win over the analog device.
    pub fn sample(&mut self, keys: &KeyState, device: Option<&DeviceSnapshot>) -> IntentSample {
        self.track_device(device);

        if keys.any_held() {
            return IntentSample::from_keys(keys);
        }

        match (&self.link, device) {
            (DeviceLink::Ready { throttle, brake, .. }, Some(snapshot)) => {
                self.analog_sample(snapshot, throttle, brake)
            }
            _ => IntentSample::from_keys(keys),
        }
    }

    fn analog_sample(
        &self,
        snapshot: &DeviceSnapshot,
        throttle: &PedalCalibration,
        brake: &PedalCalibration,
    ) -> IntentSample {
        let steer_raw = snapshot.axis(self.settings.steer_axis).unwrap_or(0.0);
        let throttle_raw = snapshot
            .axis(self.settings.throttle_axis)
            .unwrap_or(throttle.rest());
        let brake_raw = snapshot
            .axis(self.settings.brake_axis)
            .unwrap_or(brake.rest());

        IntentSample {
            throttle: apply_deadzone(throttle.pressed(throttle_raw), self.settings.pedal_deadzone),
            brake: apply_deadzone(brake.pressed(brake_raw), self.settings.pedal_deadzone),
            steer: apply_deadzone(steer_raw.clamp(-1.0, 1.0), self.settings.steer_deadzone),
            source: IntentSource::Analog,
        }
    }

    /// Follows attach/detach and feeds the calibration with rest readings.
    fn track_device(&mut self, device: Option<&DeviceSnapshot>) {
        let Some(snapshot) = device else {
            if self.link != DeviceLink::Absent {
                info!("Analog device detached, falling back to keyboard");
                self.link = DeviceLink::Absent;
                self.last_buttons.clear();
            }
            return;
        };

        let current_id = match &self.link {
            DeviceLink::Absent => None,
            DeviceLink::Calibrating { attach_id, .. }
            | DeviceLink::Ready { attach_id, .. }
            | DeviceLink::Rejected { attach_id } => Some(*attach_id),
        };
        if current_id != Some(snapshot.attach_id) {
            info!(
                "Analog device '{}' attached (id {}), sampling rest position",
                snapshot.name, snapshot.attach_id
            );
            self.link = DeviceLink::Calibrating {
                attach_id: snapshot.attach_id,
                throttle: Vec::new(),
                brake: Vec::new(),
            };
            self.last_buttons = snapshot.buttons.clone();
        }

        if let DeviceLink::Calibrating {
            attach_id,
            throttle,
            brake,
        } = &mut self.link
        {
            let attach_id = *attach_id;
            let throttle_axis = self.settings.throttle_axis;
            let brake_axis = self.settings.brake_axis;
            let (Some(t), Some(b)) = (snapshot.axis(throttle_axis), snapshot.axis(brake_axis))
            else {
                let missing = if snapshot.axis(throttle_axis).is_none() {
                    throttle_axis
                } else {
                    brake_axis
                };
                warn!(
                    "Calibration of '{}' failed: {}, treating device as disconnected",
                    snapshot.name,
                    CalibrationError::MissingAxis(missing)
                );
                self.link = DeviceLink::Rejected { attach_id };
                return;
            };
            throttle.push(t);
            brake.push(b);

            if throttle.len() >= self.settings.calibration_samples {
                let tolerance = self.settings.calibration_tolerance;
                let result = PedalCalibration::from_rest_samples(throttle_axis, throttle, tolerance)
                    .and_then(|t| {
                        PedalCalibration::from_rest_samples(brake_axis, brake, tolerance)
                            .map(|b| (t, b))
                    });
                self.link = match result {
                    Ok((throttle, brake)) => {
                        info!(
                            "Pedals calibrated: throttle rest {:.3}, brake rest {:.3}",
                            throttle.rest(),
                            brake.rest()
                        );
                        DeviceLink::Ready {
                            attach_id,
                            throttle,
                            brake,
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Calibration of '{}' failed: {}, treating device as disconnected",
                            snapshot.name, e
                        );
                        DeviceLink::Rejected { attach_id }
                    }
                };
            }
        }
    }

    /// Button presses since the last call, mapped to console actions.
    pub fn button_actions(&mut self, device: Option<&DeviceSnapshot>) -> Vec<ControlAction> {
        let Some(snapshot) = device else {
            return Vec::new();
        };
        if !matches!(self.link, DeviceLink::Ready { .. }) {
            self.last_buttons = snapshot.buttons.clone();
            return Vec::new();
        }

        let mut actions = Vec::new();
        for (index, pressed) in snapshot.buttons.iter().enumerate() {
            let was_pressed = self.last_buttons.get(index).copied().unwrap_or(false);
            if *pressed && !was_pressed {
                if let Some(action) = map_button(index) {
                    debug!("Device button {} pressed -> {:?}", index, action);
                    actions.push(action);
                }
            }
        }
        self.last_buttons = snapshot.buttons.clone();
        actions
    }
}

fn map_button(index: usize) -> Option<ControlAction> {
    match index {
        buttons::SOUTH => Some(ControlAction::Toggle(Toggle::Engine)),
        buttons::NORTH => Some(ControlAction::Toggle(Toggle::Head)),
        buttons::WEST => Some(ControlAction::Toggle(Toggle::SportMode)),
        buttons::DPAD_UP => Some(ControlAction::SelectGear(Gear::D)),
        buttons::DPAD_DOWN => Some(ControlAction::SelectGear(Gear::R)),
        buttons::DPAD_LEFT => Some(ControlAction::SelectGear(Gear::P)),
        buttons::DPAD_RIGHT => Some(ControlAction::SelectGear(Gear::N)),
        _ => None,
    }
}

/// Dead-zone with re-normalization of the remaining range to [-1, 1].
pub fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
