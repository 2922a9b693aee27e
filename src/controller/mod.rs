//! Controller subsystem for operator input
//!
//! Turns keyboard and analog-device state into driving intent:
//!
//! 1. [`keyboard`] - Terminal key source (held keys + discrete actions)
//! 2. [`event_collector`] - gilrs gamepad poller publishing device snapshots
//! 3. [`device_adapter`] - Calibration, dead-zones and intent normalization
//! 4. [`controller_handle`] - Spawns the sources and hands out their receivers
//!
//! # Architecture
//!
//! ```text
//! Keyboard ──► KeyState ───────┐
//!                              ├──► DeviceAdapter ──► IntentSample
//! Gamepad ──► DeviceSnapshot ──┘
//! ```

pub mod controller_handle;
pub mod device;
pub mod device_adapter;
pub mod event_collector;
pub mod keyboard;

pub use controller_handle::{ControllerError, ControllerHandle};
pub use device::{ControlAction, DeviceSnapshot, KeyState};
pub use device_adapter::{
    apply_deadzone, CalibrationError, DeviceAdapter, DeviceStatus, IntentSample, IntentSource,
    PedalCalibration,
};
