//! Terminal keyboard source
//!
//! Reads key events with crossterm on a dedicated thread and publishes the held
//! driving keys as a [`KeyState`]. Terminals that report key releases (kitty
//! keyboard protocol) give exact hold tracking; everywhere else a key counts as
//! held while its auto-repeat keeps arriving, and is released after
//! `key_hold_timeout_ms` of silence.
//!
//! | Key                 | Meaning                          |
//! |---------------------|----------------------------------|
//! | `W` / `Up`          | accelerate                       |
//! | `S` / `Down`        | brake                            |
//! | `A` / `Left`        | steer left                       |
//! | `D` / `Right`       | steer right                      |
//! | `P` `R` `N`         | gear request                     |
//! | `Shift+D`           | gear request D                   |
//! | `H` / `E` / `M`     | headlight / engine / sport mode  |
//! | `Esc`               | engine stop (only while running) |
//! | `Q` / `Ctrl+C`      | quit                             |

use crate::controller::device::{ControlAction, KeyState};
use crate::network::message::{Gear, Toggle};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("Terminal setup failed: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("Failed to spawn keyboard thread: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveKey {
    Throttle,
    Brake,
    SteerLeft,
    SteerRight,
}

/// Result of interpreting one terminal key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Drive { key: DriveKey, pressed: bool },
    Action(ControlAction),
    Ignore,
}

pub fn map_key_event(event: &KeyEvent) -> KeyInput {
    let pressed = match event.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => true,
        KeyEventKind::Release => false,
    };
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);

    let drive = |key| KeyInput::Drive { key, pressed };
    match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            on_press(pressed, ControlAction::Quit)
        }
        KeyCode::Up => drive(DriveKey::Throttle),
        KeyCode::Down => drive(DriveKey::Brake),
        KeyCode::Left => drive(DriveKey::SteerLeft),
        KeyCode::Right => drive(DriveKey::SteerRight),
        KeyCode::Esc => on_press(pressed, ControlAction::EngineStop),
        KeyCode::Char(c) => {
            let upper = shift || c.is_ascii_uppercase();
            match c.to_ascii_lowercase() {
                'd' if upper => on_press(pressed, ControlAction::SelectGear(Gear::D)),
                'w' => drive(DriveKey::Throttle),
                's' => drive(DriveKey::Brake),
                'a' => drive(DriveKey::SteerLeft),
                'd' => drive(DriveKey::SteerRight),
                'p' => on_press(pressed, ControlAction::SelectGear(Gear::P)),
                'r' => on_press(pressed, ControlAction::SelectGear(Gear::R)),
                'n' => on_press(pressed, ControlAction::SelectGear(Gear::N)),
                'h' => on_press(pressed, ControlAction::Toggle(Toggle::Head)),
                'e' => on_press(pressed, ControlAction::Toggle(Toggle::Engine)),
                'm' => on_press(pressed, ControlAction::Toggle(Toggle::SportMode)),
                'q' => on_press(pressed, ControlAction::Quit),
                _ => KeyInput::Ignore,
            }
        }
        _ => KeyInput::Ignore,
    }
}

fn on_press(pressed: bool, action: ControlAction) -> KeyInput {
    if pressed {
        KeyInput::Action(action)
    } else {
        KeyInput::Ignore
    }
}

/// Hold bookkeeping for the driving keys.
#[derive(Debug, Clone)]
pub struct KeyTracker {
    last_seen: HashMap<DriveKey, Instant>,
    releases_reported: bool,
    hold_timeout: Duration,
}

impl KeyTracker {
    pub fn new(releases_reported: bool, hold_timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            releases_reported,
            hold_timeout,
        }
    }

    pub fn press(&mut self, key: DriveKey, now: Instant) {
        self.last_seen.insert(key, now);
    }

    pub fn release(&mut self, key: DriveKey) {
        self.last_seen.remove(&key);
    }

    pub fn state(&mut self, now: Instant) -> KeyState {
        if !self.releases_reported {
            let timeout = self.hold_timeout;
            self.last_seen
                .retain(|_, seen| now.saturating_duration_since(*seen) < timeout);
        }
        KeyState {
            throttle: self.last_seen.contains_key(&DriveKey::Throttle),
            brake: self.last_seen.contains_key(&DriveKey::Brake),
            steer_left: self.last_seen.contains_key(&DriveKey::SteerLeft),
            steer_right: self.last_seen.contains_key(&DriveKey::SteerRight),
        }
    }
}

struct RawModeGuard {
    enhanced: bool,
}

impl RawModeGuard {
    fn enter() -> Result<Self, KeyboardError> {
        terminal::enable_raw_mode()?;
        let enhanced = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
        if enhanced {
            execute!(
                std::io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        Ok(Self { enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        }
        if let Err(e) = terminal::disable_raw_mode() {
            error!("Failed to restore terminal: {}", e);
        }
    }
}

/// Spawns the keyboard reader thread.
pub fn spawn_keyboard(
    hold_timeout: Duration,
    key_sender: watch::Sender<KeyState>,
    action_sender: mpsc::Sender<ControlAction>,
    cancel: CancellationToken,
) -> Result<std::thread::JoinHandle<()>, KeyboardError> {
    std::thread::Builder::new()
        .name("keyboard".to_string())
        .spawn(move || {
            if let Err(e) = run_keyboard(hold_timeout, key_sender, action_sender, cancel) {
                error!("Keyboard source stopped: {}", e);
            }
        })
        .map_err(|e| KeyboardError::Spawn(e.to_string()))
}

fn run_keyboard(
    hold_timeout: Duration,
    key_sender: watch::Sender<KeyState>,
    action_sender: mpsc::Sender<ControlAction>,
    cancel: CancellationToken,
) -> Result<(), KeyboardError> {
    let guard = RawModeGuard::enter()?;
    if guard.enhanced {
        info!("Terminal reports key releases, using exact hold tracking");
    } else {
        warn!(
            "Terminal does not report key releases, holds expire after {}ms",
            hold_timeout.as_millis()
        );
    }
    let mut tracker = KeyTracker::new(guard.enhanced, hold_timeout);

    while !cancel.is_cancelled() {
        if event::poll(Duration::from_millis(10))? {
            if let Event::Key(key_event) = event::read()? {
                match map_key_event(&key_event) {
                    KeyInput::Drive { key, pressed: true } => tracker.press(key, Instant::now()),
                    KeyInput::Drive { key, pressed: false } => tracker.release(key),
                    KeyInput::Action(action) => {
                        debug!("Key action: {:?}", action);
                        if let Err(e) = action_sender.try_send(action) {
                            warn!("Dropping key action {:?}: {}", action, e);
                        }
                    }
                    KeyInput::Ignore => {}
                }
            }
        }

        let state = tracker.state(Instant::now());
        key_sender.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    drop(guard);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceSettings;

    #[test]
    fn default_hold_survives_initial_autorepeat_delay() {
        let timeout = Duration::from_millis(DeviceSettings::default().key_hold_timeout_ms);
        let mut tracker = KeyTracker::new(false, timeout);
        let t0 = Instant::now();
        tracker.press(DriveKey::Throttle, t0);

        // X11 waits 660 ms before the first repeat
        assert!(tracker.state(t0 + Duration::from_millis(660)).throttle);
        tracker.press(DriveKey::Throttle, t0 + Duration::from_millis(660));
        assert!(tracker.state(t0 + Duration::from_millis(1300)).throttle);
        assert!(!tracker.state(t0 + Duration::from_millis(1400)).throttle);
    }

    fn key(code: KeyCode, kind: KeyEventKind, modifiers: KeyModifiers) -> KeyEvent {
        let mut event = KeyEvent::new(code, modifiers);
        event.kind = kind;
        event
    }

    #[test]
    fn lowercase_d_steers_and_shift_d_selects_drive() {
        assert_eq!(
            map_key_event(&key(KeyCode::Char('d'), KeyEventKind::Press, KeyModifiers::NONE)),
            KeyInput::Drive {
                key: DriveKey::SteerRight,
                pressed: true
            }
        );
        assert_eq!(
            map_key_event(&key(KeyCode::Char('D'), KeyEventKind::Press, KeyModifiers::SHIFT)),
            KeyInput::Action(ControlAction::SelectGear(Gear::D))
        );
    }

    #[test]
    fn release_of_action_key_is_ignored() {
        assert_eq!(
            map_key_event(&key(KeyCode::Char('h'), KeyEventKind::Release, KeyModifiers::NONE)),
            KeyInput::Ignore
        );
    }

    #[test]
    fn holds_expire_without_release_reports() {
        let start = Instant::now();
        let mut tracker = KeyTracker::new(false, Duration::from_millis(500));
        tracker.press(DriveKey::Throttle, start);
        assert!(tracker.state(start + Duration::from_millis(100)).throttle);
        assert!(!tracker.state(start + Duration::from_millis(600)).throttle);
    }

    #[test]
    fn holds_persist_when_releases_are_reported() {
        let start = Instant::now();
        let mut tracker = KeyTracker::new(true, Duration::from_millis(500));
        tracker.press(DriveKey::Brake, start);
        assert!(tracker.state(start + Duration::from_secs(5)).brake);
        tracker.release(DriveKey::Brake);
        assert!(!tracker.state(start + Duration::from_secs(5)).brake);
    }
}
