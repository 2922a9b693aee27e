//! State Reconciler - merges inbound telemetry into the authoritative vehicle state
//!
//! The remote controller is the single source of truth. Inbound frames are
//! sparse: a field that is absent keeps its previous value, nothing is inferred.
//! The console's own requests (gear changes, toggles) are only remembered as
//! pending until the remote confirms or contradicts them.
//!
//! Engine transitions are detected here and nowhere else, so the start sweep
//! only ever runs on a confirmed off→on change.

use crate::network::message::{Gear, InboundMessage, Toggle};
use crate::state::animation::AnimationController;
use std::collections::HashSet;
use tracing::{debug, info};

/// Last confirmed vehicle state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthoritativeState {
    pub engine_running: bool,
    pub gear: Gear,
    pub virtual_gear: Option<u8>,
    pub head_on: bool,
    pub sport_mode_on: bool,
    pub esc_armed: Option<bool>,
    pub shift_state: Option<String>,
    pub torque_cmd: Option<f64>,
    pub rpm_norm: Option<f64>,
    pub speed_pct: Option<f64>,
    pub steer_angle: Option<f64>,
    pub throttle_angle: Option<f64>,
    pub current_speed_kmh: Option<f64>,
    pub pong: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    EngineRunning,
    Gear,
    VirtualGear,
    HeadOn,
    SportModeOn,
    EscArmed,
    ShiftState,
    TorqueCmd,
    RpmNorm,
    SpeedPct,
    SteerAngle,
    ThrottleAngle,
    CurrentSpeedKmh,
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTransition {
    Started,
    Stopped,
}

/// Outcome of merging one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub changed: Vec<StateField>,
    pub engine: Option<EngineTransition>,
    /// Server hints to surface briefly, never stored in the state
    pub notices: Vec<String>,
    pub shift_fail: bool,
}

impl Reconciliation {
    pub fn touched(&self, field: StateField) -> bool {
        self.changed.contains(&field)
    }
}

/// Requests sent by the console and not yet confirmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingRequests {
    pub gear: Option<Gear>,
    pub toggles: HashSet<Toggle>,
}

impl PendingRequests {
    pub fn is_empty(&self) -> bool {
        self.gear.is_none() && self.toggles.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateReconciler {
    state: AuthoritativeState,
    pending: PendingRequests,
}

fn merge<T: PartialEq>(
    slot: &mut T,
    incoming: Option<T>,
    field: StateField,
    changed: &mut Vec<StateField>,
) {
    if let Some(value) = incoming {
        if *slot != value {
            *slot = value;
            changed.push(field);
        }
    }
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AuthoritativeState {
        &self.state
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn request_gear(&mut self, gear: Gear) {
        debug!("Gear {} requested", gear);
        self.pending.gear = Some(gear);
    }

    pub fn request_toggle(&mut self, toggle: Toggle) {
        debug!("Toggle {:?} requested", toggle);
        self.pending.toggles.insert(toggle);
    }

    /// Sparse-merges `message` and drives the sweep on confirmed engine transitions.
    pub fn apply(
        &mut self,
        message: &InboundMessage,
        animation: &mut AnimationController,
    ) -> Reconciliation {
        let mut changed = Vec::new();
        let was_running = self.state.engine_running;
        let s = &mut self.state;

        merge(&mut s.engine_running, message.engine_running, StateField::EngineRunning, &mut changed);
        merge(&mut s.gear, message.gear, StateField::Gear, &mut changed);
        merge(&mut s.virtual_gear, message.virtual_gear.map(Some), StateField::VirtualGear, &mut changed);
        merge(&mut s.head_on, message.head_on, StateField::HeadOn, &mut changed);
        merge(&mut s.sport_mode_on, message.sport_mode_on, StateField::SportModeOn, &mut changed);
        merge(&mut s.esc_armed, message.esc_armed.map(Some), StateField::EscArmed, &mut changed);
        merge(
            &mut s.shift_state,
            message.shift_state.clone().map(Some),
            StateField::ShiftState,
            &mut changed,
        );
        merge(&mut s.torque_cmd, message.torque_cmd.map(Some), StateField::TorqueCmd, &mut changed);
        merge(
            &mut s.rpm_norm,
            message.rpm_norm.map(|v| Some(v.clamp(0.0, 1.0))),
            StateField::RpmNorm,
            &mut changed,
        );
        merge(&mut s.speed_pct, message.speed_pct.map(Some), StateField::SpeedPct, &mut changed);
        merge(&mut s.steer_angle, message.steer_angle.map(Some), StateField::SteerAngle, &mut changed);
        merge(
            &mut s.throttle_angle,
            message.throttle_angle.map(Some),
            StateField::ThrottleAngle,
            &mut changed,
        );
        merge(
            &mut s.current_speed_kmh,
            message.current_speed_kmh.map(Some),
            StateField::CurrentSpeedKmh,
            &mut changed,
        );
        merge(&mut s.pong, message.pong.map(Some), StateField::Pong, &mut changed);

        // Any confirmation settles the matching request, agreeing or not
        if message.gear.is_some() {
            self.pending.gear = None;
        }
        if message.head_on.is_some() {
            self.pending.toggles.remove(&Toggle::Head);
        }
        if message.sport_mode_on.is_some() {
            self.pending.toggles.remove(&Toggle::SportMode);
        }
        if message.engine_running.is_some() {
            self.pending.toggles.remove(&Toggle::Engine);
        }

        let engine = match (was_running, self.state.engine_running) {
            (false, true) => {
                info!("Engine start confirmed");
                self.pending = PendingRequests::default();
                animation.start();
                Some(EngineTransition::Started)
            }
            (true, false) => {
                info!("Engine stop confirmed");
                if animation.is_active() {
                    animation.cancel();
                }
                Some(EngineTransition::Stopped)
            }
            _ => None,
        };

        if !changed.is_empty() {
            debug!("Reconciled fields: {:?}", changed);
        }

        Reconciliation {
            changed,
            engine,
            notices: message.notices(),
            shift_fail: message.shift_fail,
        }
    }
}
