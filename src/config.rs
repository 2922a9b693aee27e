//! # Console Configuration
//!
//! ## Why This Module Exists
//! Every tunable of the console (shaping rates, smoothing constants, steering
//! return physics, channel pacing, sweep timings) lives in one TOML file so the
//! operator can retune a vehicle without rebuilding. Each component only ever
//! receives its own section, never the whole [`ConsoleConfig`].
//!
//! ## Loading Strategy
//! The file location is resolved from the first CLI argument, then the
//! `OPENCOCKPIT_CONFIG` environment variable, then
//! `<config_dir>/opencockpit/config.toml`. A missing default file is written
//! out with default values so the operator has something to edit. Every section
//! is `#[serde(default)]`, so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "OPENCOCKPIT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write default config to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Complete console configuration as stored on disk.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub network: NetworkSettings,
    pub shaping: ShapingSettings,
    pub steering: SteeringSettings,
    pub device: DeviceSettings,
    pub animation: AnimationSettings,
    pub gauges: GaugeSettings,
    pub scheduler: SchedulerSettings,
}

/// Duplex channel endpoint and pacing.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NetworkSettings {
    /// WebSocket endpoint of the remote controller
    pub url: String,
    /// Minimum spacing between two axis frames
    pub send_interval_ms: u64,
    /// Latency probe period while connected
    pub probe_interval_ms: u64,
    /// First reconnect delay, also the value restored after a successful connect
    pub backoff_initial_ms: u64,
    /// Upper bound of the reconnect delay
    pub backoff_max_ms: u64,
    /// Give up on a single connection attempt after this long
    pub connect_timeout_ms: u64,
    /// Capacity of the per-connection writer queue; sends beyond it are dropped
    pub outbound_capacity: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            send_interval_ms: 70,
            probe_interval_ms: 1000,
            backoff_initial_ms: 1000,
            backoff_max_ms: 30_000,
            connect_timeout_ms: 5000,
            outbound_capacity: 8,
        }
    }
}

impl NetworkSettings {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// How accelerator and brake are carried on the wire.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AxisLayout {
    /// One signed axis: positive accelerates, negative brakes
    #[default]
    Combined,
    /// Two unsigned axes, one per pedal
    Split,
}

/// Axis bounds, slew rates and smoothing.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ShapingSettings {
    pub layout: AxisLayout,
    /// Lower bound of the combined axis (brake side)
    pub axis_min: f64,
    /// Upper bound of the combined axis, also the bound of each split axis
    pub axis_max: f64,
    /// Combined layout: ramp rate towards `axis_max` in units per second
    pub slew_up_per_s: f64,
    /// Combined layout: ramp rate towards `axis_min` in units per second
    pub slew_down_per_s: f64,
    /// Split layout: accelerator ramp rate in units per second
    pub accel_rate_per_s: f64,
    /// Split layout: brake ramp rate in units per second
    pub brake_rate_per_s: f64,
    /// Decay towards zero when no key is held, units per second
    pub release_rate_per_s: f64,
    /// Analog smoothing time constant
    pub smoothing_tau_ms: f64,
    /// Dead-zone applied to the axis bar only, in axis units
    pub display_deadzone: f64,
}

impl Default for ShapingSettings {
    fn default() -> Self {
        Self {
            layout: AxisLayout::Combined,
            axis_min: -50.0,
            axis_max: 50.0,
            slew_up_per_s: 140.0,
            slew_down_per_s: 140.0,
            accel_rate_per_s: 140.0,
            brake_rate_per_s: 200.0,
            release_rate_per_s: 140.0,
            smoothing_tau_ms: 50.0,
            display_deadzone: 5.0,
        }
    }
}

/// Steering delta cadence and auto-centering physics.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SteeringSettings {
    /// Mechanical lock, the accumulated angle never exceeds +/- this value
    pub max_angle_deg: f64,
    /// Delta emitted per cadence step at full steer intent
    pub delta_step_deg: f64,
    /// Hard bound on a single delta
    pub max_delta_deg: f64,
    /// Spacing of steering deltas while steering is held
    pub delta_cadence_ms: u64,
    /// Quiet period after the last delta before auto-return may start
    pub return_grace_ms: u64,
    /// Return rate at the smallest non-zero throttle factor
    pub idle_return_deg_per_s: f64,
    /// Return rate at full throttle
    pub full_return_deg_per_s: f64,
    /// Throttle servo angle at standstill
    pub throttle_neutral_deg: f64,
    /// Throttle servo angle at full forward
    pub throttle_forward_max_deg: f64,
    /// Throttle servo angle at full reverse
    pub throttle_reverse_max_deg: f64,
    /// Throttle readings within this distance of neutral count as idle
    pub throttle_deadband_deg: f64,
}

impl Default for SteeringSettings {
    fn default() -> Self {
        Self {
            max_angle_deg: 45.0,
            delta_step_deg: 3.0,
            max_delta_deg: 5.0,
            delta_cadence_ms: 50,
            return_grace_ms: 150,
            idle_return_deg_per_s: 15.0,
            full_return_deg_per_s: 120.0,
            throttle_neutral_deg: 120.0,
            throttle_forward_max_deg: 180.0,
            throttle_reverse_max_deg: 65.0,
            throttle_deadband_deg: 2.0,
        }
    }
}

impl SteeringSettings {
    pub fn delta_cadence(&self) -> Duration {
        Duration::from_millis(self.delta_cadence_ms)
    }

    pub fn return_grace(&self) -> Duration {
        Duration::from_millis(self.return_grace_ms)
    }
}

/// Analog device axis assignment and calibration tolerances.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceSettings {
    /// Disable the gamepad poller entirely
    pub gamepad_enabled: bool,
    pub steer_axis: usize,
    pub throttle_axis: usize,
    pub brake_axis: usize,
    pub steer_deadzone: f64,
    pub pedal_deadzone: f64,
    /// Consecutive rest readings required before a pedal is considered calibrated
    pub calibration_samples: usize,
    /// Maximum spread of the rest readings
    pub calibration_tolerance: f64,
    /// Keyboard fallback when the terminal reports no key releases
    pub key_hold_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            gamepad_enabled: true,
            steer_axis: 0,
            throttle_axis: 5,
            brake_axis: 4,
            steer_deadzone: 0.05,
            pedal_deadzone: 0.02,
            calibration_samples: 5,
            calibration_tolerance: 0.05,
            key_hold_timeout_ms: 700,
        }
    }
}

/// Engine-start sweep timings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnimationSettings {
    pub rising_ms: u64,
    pub holding_ms: u64,
    pub falling_ms: u64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            rising_ms: 700,
            holding_ms: 150,
            falling_ms: 600,
        }
    }
}

/// Instrument scaling.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GaugeSettings {
    pub rpm_max: f64,
    pub rpm_idle: f64,
    pub rpm_redzone: f64,
    pub speed_max: f64,
    /// Lifetime of a server hint on screen
    pub notice_duration_ms: u64,
    /// How long the gear label flashes after the remote refused a shift
    pub shift_fail_flash_ms: u64,
}

impl Default for GaugeSettings {
    fn default() -> Self {
        Self {
            rpm_max: 8000.0,
            rpm_idle: 700.0,
            rpm_redzone: 7000.0,
            speed_max: 100.0,
            notice_duration_ms: 2200,
            shift_fail_flash_ms: 400,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Frame rate of the render tick
    pub tick_hz: u32,
    /// Period of the stats log line
    pub stats_interval_s: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            stats_interval_s: 10,
        }
    }
}

impl GaugeSettings {
    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }

    pub fn shift_fail_flash(&self) -> Duration {
        Duration::from_millis(self.shift_fail_flash_ms)
    }
}

impl SchedulerSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }
}

impl ConsoleConfig {
    /// Resolves the config path: explicit argument, then env var, then the platform default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("opencockpit").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Writes a default config file if none exists yet.
    pub fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            debug!("Config file present at {}", path.display());
            return Ok(());
        }

        info!("No config found, writing defaults to {}", path.display());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(&ConsoleConfig::default())?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ConsoleConfig =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let shaping = &self.shaping;
        if shaping.axis_min >= 0.0 || shaping.axis_max <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "axis range must straddle zero, got [{}, {}]",
                shaping.axis_min, shaping.axis_max
            )));
        }
        let rates = [
            shaping.slew_up_per_s,
            shaping.slew_down_per_s,
            shaping.accel_rate_per_s,
            shaping.brake_rate_per_s,
            shaping.release_rate_per_s,
        ];
        if rates.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(ConfigError::Invalid(
                "slew and release rates must be positive".to_string(),
            ));
        }
        if !(shaping.smoothing_tau_ms > 0.0) {
            return Err(ConfigError::Invalid(
                "smoothing_tau_ms must be positive".to_string(),
            ));
        }

        let device = &self.device;
        for (name, d) in [
            ("steer_deadzone", device.steer_deadzone),
            ("pedal_deadzone", device.pedal_deadzone),
        ] {
            if !(0.0..1.0).contains(&d) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1), got {d}"
                )));
            }
        }
        if device.calibration_samples == 0 {
            return Err(ConfigError::Invalid(
                "calibration_samples must be at least 1".to_string(),
            ));
        }

        let steering = &self.steering;
        if steering.max_angle_deg <= 0.0 || steering.max_delta_deg <= 0.0 {
            return Err(ConfigError::Invalid(
                "steering limits must be positive".to_string(),
            ));
        }
        if steering.full_return_deg_per_s < steering.idle_return_deg_per_s {
            return Err(ConfigError::Invalid(
                "full_return_deg_per_s must not be below idle_return_deg_per_s".to_string(),
            ));
        }
        if steering.throttle_forward_max_deg <= steering.throttle_neutral_deg
            || steering.throttle_reverse_max_deg >= steering.throttle_neutral_deg
        {
            return Err(ConfigError::Invalid(
                "throttle servo range must bracket the neutral angle".to_string(),
            ));
        }

        let network = &self.network;
        if network.backoff_initial_ms == 0 || network.backoff_max_ms < network.backoff_initial_ms
        {
            return Err(ConfigError::Invalid(format!(
                "backoff must satisfy 0 < initial ({}) <= max ({})",
                network.backoff_initial_ms, network.backoff_max_ms
            )));
        }
        if network.send_interval_ms == 0 || network.probe_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "send and probe intervals must be non-zero".to_string(),
            ));
        }
        if network.outbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_capacity must be at least 1".to_string(),
            ));
        }

        let animation = &self.animation;
        if animation.rising_ms == 0 || animation.falling_ms == 0 {
            warn!("Sweep with zero-length rise or fall configured, phase will be skipped");
        }

        if self.gauges.rpm_max <= 0.0 || self.gauges.speed_max <= 0.0 {
            return Err(ConfigError::Invalid(
                "gauge maxima must be positive".to_string(),
            ));
        }
        if self.scheduler.tick_hz == 0 {
            return Err(ConfigError::Invalid("tick_hz must be non-zero".to_string()));
        }

        Ok(())
    }
}
