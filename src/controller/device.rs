//! Polled input boundary shared by the keyboard and gamepad sources.
//!
//! Sources publish their latest state on `watch` channels; the scheduler reads
//! whatever is current once per tick. Discrete presses (gear, toggles) travel
//! separately as [`ControlAction`]s because an edge must not be lost between
//! two polls.

use crate::network::message::{Gear, Toggle};

/// Held state of the four driving keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub throttle: bool,
    pub brake: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

impl KeyState {
    pub fn any_held(&self) -> bool {
        self.throttle || self.brake || self.steer_left || self.steer_right
    }
}

/// Snapshot of an analog device: N axes in [-1, 1] and M buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    /// Changes every time a device is (re)attached
    pub attach_id: u64,
    pub name: String,
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
}

impl DeviceSnapshot {
    pub fn axis(&self, index: usize) -> Option<f64> {
        self.axes.get(index).map(|v| f64::from(*v))
    }
}

/// Fixed button slots of a [`DeviceSnapshot`]
pub mod buttons {
    pub const SOUTH: usize = 0;
    pub const EAST: usize = 1;
    pub const NORTH: usize = 2;
    pub const WEST: usize = 3;
    pub const DPAD_UP: usize = 4;
    pub const DPAD_DOWN: usize = 5;
    pub const DPAD_LEFT: usize = 6;
    pub const DPAD_RIGHT: usize = 7;
    pub const START: usize = 8;
    pub const SELECT: usize = 9;
    pub const COUNT: usize = 10;
}

/// Fixed axis slots of a [`DeviceSnapshot`]
pub mod axes {
    pub const LEFT_STICK_X: usize = 0;
    pub const LEFT_STICK_Y: usize = 1;
    pub const RIGHT_STICK_X: usize = 2;
    pub const RIGHT_STICK_Y: usize = 3;
    pub const LEFT_TRIGGER: usize = 4;
    pub const RIGHT_TRIGGER: usize = 5;
    pub const COUNT: usize = 6;
}

/// A discrete operator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    SelectGear(Gear),
    Toggle(Toggle),
    /// Stop the engine, only forwarded while the confirmed state says it runs
    EngineStop,
    Quit,
}
