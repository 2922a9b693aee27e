//! Controller Handle - unified entry point for the operator input sources
//!
//! Spawns the keyboard reader and (optionally) the gamepad poller, and hands the
//! scheduler the receiving ends it polls once per tick.
//!
//! # Threading Model
//!
//! ```text
//! keyboard thread ─[watch<KeyState>]──────────────────┐
//!                 ─[mpsc<ControlAction>]──────────────┤
//! gamepad thread  ─[watch<Option<DeviceSnapshot>>]────┴──► RenderScheduler
//! ```
//!
//! Both threads own their OS resources (raw terminal, gilrs context) and only
//! ever send plain values. They stop when the shared cancellation token fires.

use crate::config::DeviceSettings;
use crate::controller::device::{ControlAction, DeviceSnapshot, KeyState};
use crate::controller::event_collector::{spawn_collector, CollectorError, CollectorSettings};
use crate::controller::keyboard::{spawn_keyboard, KeyboardError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can occur while starting the input sources
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Error from the gamepad poller
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    /// Error from the keyboard reader
    #[error("Keyboard error: {0}")]
    KeyboardError(#[from] KeyboardError),
}

/// Receiving ends of all input sources.
pub struct ControllerHandle {
    pub keys: watch::Receiver<KeyState>,
    pub device: watch::Receiver<Option<DeviceSnapshot>>,
    pub actions: mpsc::Receiver<ControlAction>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl ControllerHandle {
    /// Spawns the keyboard reader and, if enabled, the gamepad poller.
    ///
    /// A gamepad that cannot be initialized is not an error: the console keeps
    /// running on the keyboard alone.
    pub fn spawn(
        settings: &DeviceSettings,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing input sources with settings: {:?}", settings);

        let (key_tx, key_rx) = watch::channel(KeyState::default());
        let (device_tx, device_rx) = watch::channel(None);
        let (action_tx, action_rx) = mpsc::channel(64);
        debug!("Created input channels (action buffer 64)");

        let mut threads = Vec::new();
        threads.push(spawn_keyboard(
            Duration::from_millis(settings.key_hold_timeout_ms),
            key_tx,
            action_tx,
            cancel.clone(),
        )?);
        info!("Keyboard source spawned successfully");

        if settings.gamepad_enabled {
            match spawn_collector(CollectorSettings::default(), device_tx, cancel) {
                Ok(handle) => {
                    threads.push(handle);
                    info!("Gamepad Collector spawned successfully");
                }
                Err(e) => warn!("Gamepad input unavailable: {}", e),
            }
        } else {
            info!("Gamepad input disabled by configuration");
        }

        Ok(Self {
            keys: key_rx,
            device: device_rx,
            actions: action_rx,
            threads,
        })
    }

    /// Waits for the input threads after cancellation.
    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!("Input thread panicked during shutdown");
            }
        }
    }
}
