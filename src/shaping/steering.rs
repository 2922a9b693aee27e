use crate::config::SteeringSettings;
use crate::network::message::Gear;
use tracing::debug;

/// Accumulated steering angle in degrees, negative is left.
///
/// Changes only through [`apply_delta`](Self::apply_delta) and
/// [`auto_return`](Self::auto_return); [`reset`](Self::reset) is reserved for
/// a fresh connection.
#[derive(Debug, Clone)]
pub struct SteeringAccumulator {
    settings: SteeringSettings,
    angle: f64,
    // Time since the last delta, drives the grace window
    quiet_s: f64,
    // Time since the last cadence step; None while not steering
    cadence_s: Option<f64>,
}

impl SteeringAccumulator {
    pub fn new(settings: SteeringSettings) -> Self {
        Self {
            settings,
            angle: 0.0,
            quiet_s: f64::INFINITY,
            cadence_s: None,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Applies one signed delta, bounded per step and by the steering lock.
    /// Returns the change actually applied.
    pub fn apply_delta(&mut self, delta_deg: f64) -> f64 {
        let s = &self.settings;
        let bounded = delta_deg.clamp(-s.max_delta_deg, s.max_delta_deg);
        let before = self.angle;
        self.angle = (self.angle + bounded).clamp(-s.max_angle_deg, s.max_angle_deg);
        self.quiet_s = 0.0;
        self.angle - before
    }

    /// Emits a delta on the configured cadence while `steer` is non-zero.
    ///
    /// The first tick of a new steering input emits at once; later deltas
    /// follow every `delta_cadence_ms`.
    pub fn steer(&mut self, steer: f64, dt_seconds: f64) -> Option<f64> {
        if steer == 0.0 || !steer.is_finite() {
            self.cadence_s = None;
            return None;
        }
        let cadence = self.settings.delta_cadence().as_secs_f64();
        let due = match self.cadence_s {
            None => true,
            Some(elapsed) => elapsed + dt_seconds.max(0.0) >= cadence,
        };
        if due {
            self.cadence_s = Some(0.0);
            let requested = steer.clamp(-1.0, 1.0) * self.settings.delta_step_deg;
            Some(self.apply_delta(requested))
        } else {
            let dt = dt_seconds.max(0.0);
            self.cadence_s = self.cadence_s.map(|elapsed| elapsed + dt);
            self.quiet_s += dt;
            None
        }
    }

    /// Whole-degree wire value for an applied step, never beyond `max_delta_deg`.
    /// `None` when the step rounds to nothing.
    pub fn wire_step(&self, applied_deg: f64) -> Option<i32> {
        let bound = self.settings.max_delta_deg.floor();
        let step = applied_deg.round().clamp(-bound, bound);
        (step.is_finite() && step != 0.0).then_some(step as i32)
    }

    /// How hard the vehicle is being driven, in [0, 1], from the throttle servo angle.
    pub fn throttle_factor(&self, throttle_angle: Option<f64>, gear: Gear) -> f64 {
        let s = &self.settings;
        let Some(angle) = throttle_angle.filter(|a| a.is_finite()) else {
            return 0.0;
        };
        let (offset, span) = match gear {
            Gear::D => (
                angle - s.throttle_neutral_deg,
                s.throttle_forward_max_deg - s.throttle_neutral_deg,
            ),
            Gear::R => (
                s.throttle_neutral_deg - angle,
                s.throttle_neutral_deg - s.throttle_reverse_max_deg,
            ),
            Gear::P | Gear::N => return 0.0,
        };
        if offset <= s.throttle_deadband_deg || span <= 0.0 {
            0.0
        } else {
            (offset / span).clamp(0.0, 1.0)
        }
    }

    /// Decays the angle towards centre when no delta arrived for the grace
    /// window and the vehicle is moving. Returns the new angle.
    pub fn auto_return(&mut self, dt_seconds: f64, throttle_angle: Option<f64>, gear: Gear) -> f64 {
        let dt = dt_seconds.max(0.0);
        self.quiet_s += dt;
        if self.angle == 0.0 || self.quiet_s < self.settings.return_grace().as_secs_f64() {
            return self.angle;
        }

        let factor = self.throttle_factor(throttle_angle, gear);
        if factor <= 0.0 {
            return self.angle;
        }

        let s = &self.settings;
        let rate = s.idle_return_deg_per_s + (s.full_return_deg_per_s - s.idle_return_deg_per_s) * factor;
        let step = rate * dt;
        if self.angle.abs() <= step {
            debug!("Steering centred");
            self.angle = 0.0;
        } else {
            self.angle -= step * self.angle.signum();
        }
        self.angle
    }

    pub fn reset(&mut self) {
        self.angle = 0.0;
        self.quiet_s = f64::INFINITY;
        self.cadence_s = None;
    }
}
