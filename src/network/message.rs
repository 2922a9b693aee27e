//! Wire schema shared by outbound commands and inbound vehicle state.
//!
//! One JSON object per WebSocket text frame. Outbound frames carry exactly one
//! logical command; inbound frames are sparse state updates, and any field the
//! console does not know is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload has a field of the wrong type: {0}")]
    InvalidField(#[source] serde_json::Error),

    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Transmission lever position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gear {
    #[default]
    P,
    R,
    N,
    D,
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Gear::P => "P",
            Gear::R => "R",
            Gear::N => "N",
            Gear::D => "D",
        };
        write!(f, "{label}")
    }
}

/// Shaped pedal values ready for the wire, already rounded and clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisFrame {
    Combined(i32),
    Split { accel: i32, brake: i32 },
}

/// Fire-and-forget switches. The remote decides; the console only asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toggle {
    Head,
    Engine,
    SportMode,
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Drive(AxisFrame),
    /// One steering step in whole degrees, sent on its own cadence
    Steer(i32),
    Gear(Gear),
    Toggle(Toggle),
    Ping(f64),
}

#[derive(Serialize, Default)]
struct WireCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    axis: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accel_axis: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brake_axis: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steer_delta: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gear: Option<Gear>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_toggle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_toggle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sport_mode_toggle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ping: Option<f64>,
}

impl ControlCommand {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut wire = WireCommand::default();
        match self {
            ControlCommand::Drive(AxisFrame::Combined(value)) => wire.axis = Some(*value),
            ControlCommand::Drive(AxisFrame::Split { accel, brake }) => {
                wire.accel_axis = Some(*accel);
                wire.brake_axis = Some(*brake);
            }
            ControlCommand::Steer(delta) => wire.steer_delta = Some(*delta),
            ControlCommand::Gear(gear) => wire.gear = Some(*gear),
            ControlCommand::Toggle(Toggle::Head) => wire.head_toggle = Some(true),
            ControlCommand::Toggle(Toggle::Engine) => wire.engine_toggle = Some(true),
            ControlCommand::Toggle(Toggle::SportMode) => wire.sport_mode_toggle = Some(true),
            ControlCommand::Ping(stamp) => wire.ping = Some(*stamp),
        }
        serde_json::to_string(&wire).map_err(ProtocolError::Encode)
    }
}

/// Sparse inbound update. Every field is optional; absent means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    pub engine_running: Option<bool>,
    pub gear: Option<Gear>,
    pub virtual_gear: Option<u8>,
    pub head_on: Option<bool>,
    pub sport_mode_on: Option<bool>,
    pub esc_armed: Option<bool>,
    pub shift_state: Option<String>,
    pub torque_cmd: Option<f64>,
    #[serde(alias = "virtual_rpm")]
    pub rpm_norm: Option<f64>,
    pub speed_pct: Option<f64>,
    pub steer_angle: Option<f64>,
    #[serde(alias = "motor_angle")]
    pub throttle_angle: Option<f64>,
    pub current_speed_kmh: Option<f64>,
    pub pong: Option<f64>,

    // Transient notices, never merged into vehicle state
    pub brake_hint: Option<String>,
    pub engine_stop_hint: Option<String>,
    #[serde(default)]
    pub shift_fail: bool,
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        serde_json::from_value(value).map_err(ProtocolError::InvalidField)
    }

    /// Hints the server attached to this frame, in arrival order.
    pub fn notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if let Some(hint) = &self.engine_stop_hint {
            notices.push(hint.clone());
        }
        if let Some(hint) = &self.brake_hint {
            notices.push(hint.clone());
        }
        notices
    }
}
