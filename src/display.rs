//! Display boundary.
//!
//! The console core never draws anything. Once per tick the scheduler builds a
//! [`DisplayFrame`] (gauges, gear label, axis bar, link health, transient
//! notices) and hands it to a [`DisplaySink`]. The bundled [`TracingDisplay`]
//! logs state changes; a graphical front end implements the same trait.

use crate::config::GaugeSettings;
use crate::controller::device_adapter::DeviceStatus;
use crate::network::channel::ConnectionHealth;
use crate::network::message::Gear;
use crate::shaping::axis_shaper::AxisDisplay;
use crate::state::animation::SweepFrame;
use crate::state::reconciler::AuthoritativeState;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayFrame {
    pub health: ConnectionHealth,
    pub engine_running: bool,
    pub sweeping: bool,
    pub rpm: f64,
    pub rpm_redzone: bool,
    pub speed_pct: f64,
    pub speed_kmh: Option<f64>,
    pub gear_label: String,
    pub requested_gear: Option<Gear>,
    pub gear_error: bool,
    pub head_on: bool,
    pub sport_mode_on: bool,
    pub esc_armed: Option<bool>,
    pub shift_state: Option<String>,
    pub torque_cmd: Option<f64>,
    /// Analog device state; anything but `Ready` means keyboard input
    pub device: DeviceStatus,
    pub axis: AxisDisplay,
    /// Locally accumulated steering angle
    pub steer_angle: f64,
    /// Steering angle reported by the vehicle
    pub remote_steer_angle: Option<f64>,
    pub notices: Vec<String>,
}

pub trait DisplaySink: Send {
    fn present(&mut self, frame: &DisplayFrame);
}

/// Instrument scaling on top of the reconciled state.
#[derive(Debug, Clone)]
pub struct GaugeModel {
    settings: GaugeSettings,
}

impl GaugeModel {
    pub fn new(settings: GaugeSettings) -> Self {
        Self { settings }
    }

    /// rpm the fall phase of the sweep settles on, normalized.
    pub fn idle_rpm_norm(&self) -> f64 {
        (self.settings.rpm_idle / self.settings.rpm_max).clamp(0.0, 1.0)
    }

    pub fn rpm(&self, state: &AuthoritativeState, sweep: Option<SweepFrame>) -> f64 {
        let norm = match sweep {
            Some(frame) => frame.rpm_norm,
            None if state.engine_running => state.rpm_norm.unwrap_or_else(|| self.idle_rpm_norm()),
            None => 0.0,
        };
        norm.clamp(0.0, 1.0) * self.settings.rpm_max
    }

    pub fn in_redzone(&self, rpm: f64) -> bool {
        rpm >= self.settings.rpm_redzone
    }

    pub fn speed_pct(&self, state: &AuthoritativeState, sweep: Option<SweepFrame>) -> f64 {
        let value = match sweep {
            Some(frame) => frame.speed_frac * self.settings.speed_max,
            None => state.speed_pct.unwrap_or(0.0),
        };
        value.clamp(0.0, self.settings.speed_max)
    }

    /// In `D` the label shows the virtual gear number when the vehicle reports one.
    pub fn gear_label(&self, state: &AuthoritativeState) -> String {
        match (state.gear, state.virtual_gear) {
            (Gear::D, Some(n)) if n > 0 => n.to_string(),
            (gear, _) => gear.to_string(),
        }
    }
}

/// Transient toasts and the gear-refused flash.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    lifetime: Duration,
    flash: Duration,
    notices: VecDeque<(String, Instant)>,
    gear_error_until: Option<Instant>,
}

impl NoticeBoard {
    pub fn new(settings: &GaugeSettings) -> Self {
        Self {
            lifetime: settings.notice_duration(),
            flash: settings.shift_fail_flash(),
            notices: VecDeque::new(),
            gear_error_until: None,
        }
    }

    pub fn push(&mut self, text: String, now: Instant) {
        info!("Notice: {}", text);
        self.notices.push_back((text, now + self.lifetime));
    }

    pub fn flag_shift_fail(&mut self, now: Instant) {
        warn!("Shift refused by vehicle");
        self.gear_error_until = Some(now + self.flash);
    }

    /// Notices still on screen at `now`, oldest first.
    pub fn active(&mut self, now: Instant) -> Vec<String> {
        self.notices.retain(|(_, expires)| *expires > now);
        self.notices.iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn gear_error(&mut self, now: Instant) -> bool {
        match self.gear_error_until {
            Some(until) if until > now => true,
            Some(_) => {
                self.gear_error_until = None;
                false
            }
            None => false,
        }
    }
}

/// Logs status changes instead of drawing them.
#[derive(Debug, Default)]
pub struct TracingDisplay {
    last: Option<DisplayFrame>,
}

impl TracingDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for TracingDisplay {
    fn present(&mut self, frame: &DisplayFrame) {
        let Some(last) = self.last.as_ref() else {
            info!(
                "Display: link {:?}, engine {}, gear {}",
                frame.health.state,
                if frame.engine_running { "on" } else { "off" },
                frame.gear_label
            );
            self.last = Some(frame.clone());
            return;
        };
        if last == frame {
            return;
        }

        if last.health.state != frame.health.state {
            info!("Link: {:?}", frame.health.state);
        }
        if last.health.latency.map(|l| l.band) != frame.health.latency.map(|l| l.band) {
            if let Some(latency) = frame.health.latency {
                info!("Latency {:.0}ms ({})", latency.rtt_ms, latency.band);
            }
        }
        if last.engine_running != frame.engine_running {
            info!("Engine {}", if frame.engine_running { "running" } else { "stopped" });
        }
        if last.gear_label != frame.gear_label || last.requested_gear != frame.requested_gear {
            match frame.requested_gear {
                Some(requested) => info!("Gear {} (requested {})", frame.gear_label, requested),
                None => info!("Gear {}", frame.gear_label),
            }
        }
        if last.device != frame.device {
            match frame.device {
                DeviceStatus::Ready => info!("Analog device ready"),
                DeviceStatus::Rejected => warn!("Analog device not calibrated, using keyboard"),
                status => info!("Analog device {:?}", status),
            }
        }
        if last.head_on != frame.head_on {
            info!("Headlight {}", if frame.head_on { "on" } else { "off" });
        }
        if last.sport_mode_on != frame.sport_mode_on {
            info!("Sport mode {}", if frame.sport_mode_on { "on" } else { "off" });
        }
        if last.esc_armed != frame.esc_armed {
            match frame.esc_armed {
                Some(true) => info!("ESC armed"),
                Some(false) => info!("ESC arming..."),
                None => {}
            }
        }
        if last.sweeping != frame.sweeping {
            debug!("Sweep {}", if frame.sweeping { "running" } else { "finished" });
        }
        trace!(
            "rpm {:.0}{} speed {:.0}% axis {} steer {:.1}",
            frame.rpm,
            if frame.rpm_redzone { " (redzone)" } else { "" },
            frame.speed_pct,
            frame.axis.readout,
            frame.steer_angle
        );

        self.last = Some(frame.clone());
    }
}
