use crate::controller::device::{axes, buttons, DeviceSnapshot};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub poll_interval_us: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_interval_us: 500,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to spawn collector thread: {0}")]
    SpawnError(String),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct GamepadCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Collector settings
    settings: CollectorSettings,

    // Latest snapshot, published on every change
    snapshot_sender: watch::Sender<Option<DeviceSnapshot>>,

    // Working copy of the active pad's state
    axes: Vec<f32>,
    buttons: Vec<bool>,

    // Bumped on every attach so the adapter recalibrates
    attach_counter: u64,
}

// Implementation for Initializing state
impl GamepadCollector<Initializing> {
    pub fn create(
        settings: CollectorSettings,
        snapshot_sender: watch::Sender<Option<DeviceSnapshot>>,
    ) -> Result<Self, CollectorError> {
        debug!("Creating Gamepad Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            snapshot_sender,
            vec![0.0; axes::COUNT],
            vec![false; buttons::COUNT],
            0,
        ))
    }

    // Pick a gamepad if one is already connected and transition to Collecting state
    pub fn initialize(mut self) -> GamepadCollector<Collecting> {
        let first = self
            .gilrs
            .gamepads()
            .next()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()));

        match first {
            Some((id, name)) => {
                info!("Selected gamepad: {} ({})", name, id);
                self.attach(id);
            }
            None => warn!("No gamepad connected, keyboard only until one appears"),
        }

        info!("Gamepad Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

impl<S: CollectionState> GamepadCollector<S> {
    fn attach(&mut self, id: GamepadId) {
        self.active_gamepad = Some(id);
        self.attach_counter += 1;
        self.axes = vec![0.0; axes::COUNT];
        self.buttons = vec![false; buttons::COUNT];

        // Seed from the pad's cached state so pedals resting away from zero are seen at once
        let gamepad = self.gilrs.gamepad(id);
        for (axis, slot) in AXIS_SLOTS {
            if let Some(data) = gamepad.axis_data(axis) {
                self.axes[slot] = data.value();
            }
        }
        for (button, slot) in TRIGGER_SLOTS {
            if let Some(data) = gamepad.button_data(button) {
                self.axes[slot] = data.value();
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.active_gamepad.map(|id| DeviceSnapshot {
            attach_id: self.attach_counter,
            name: self.gilrs.gamepad(id).name().to_string(),
            axes: self.axes.clone(),
            buttons: self.buttons.clone(),
        });
        self.snapshot_sender.send_replace(snapshot);
    }
}

// Implementation for Collecting state
impl GamepadCollector<Collecting> {
    // Drain pending gilrs events; returns how many were applied
    pub fn collect_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    if self.active_gamepad.is_none() {
                        info!(
                            "Controller connected at {}: {}",
                            Local::now().format("%H:%M:%S.%3f"),
                            self.gilrs.gamepad(id).name()
                        );
                        self.attach(id);
                    }
                    continue;
                }
                EventType::Disconnected => {
                    if self.active_gamepad == Some(id) {
                        warn!("Active controller disconnected");
                        self.active_gamepad = None;
                        self.publish();
                    }
                    continue;
                }
                _ => {}
            }

            // Only process events from the active gamepad
            if self.active_gamepad != Some(id) {
                debug!("Skipping event from non-active gamepad: {:?}", id);
                continue;
            }

            if self.apply_event(event) {
                applied += 1;
            }
        }

        if applied > 0 {
            self.publish();
        }
        applied
    }

    fn apply_event(&mut self, event: EventType) -> bool {
        match event {
            EventType::AxisChanged(axis, value, _) => match axis_slot(axis) {
                Some(slot) => {
                    self.axes[slot] = value;
                    true
                }
                None => {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    false
                }
            },
            // Analog triggers arrive as button values on most pads
            EventType::ButtonChanged(button, value, _) => match trigger_slot(button) {
                Some(slot) => {
                    self.axes[slot] = value;
                    true
                }
                None => false,
            },
            EventType::ButtonPressed(button, _) => self.set_button(button, true),
            EventType::ButtonReleased(button, _) => self.set_button(button, false),
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
                false
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                false
            }
        }
    }

    fn set_button(&mut self, button: Button, pressed: bool) -> bool {
        match button_slot(button) {
            Some(slot) => {
                debug!("Button {:?} -> {}", button, pressed);
                self.buttons[slot] = pressed;
                true
            }
            None => false,
        }
    }

    // Run the collector until cancelled
    pub fn run_collection_loop(&mut self, cancel: CancellationToken) {
        info!("Starting Gamepad Collector loop");

        let mut event_count = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);
        let sleep = std::time::Duration::from_micros(self.settings.poll_interval_us);

        while !cancel.is_cancelled() {
            event_count += self.collect_pending();

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "Gamepad Collector stats: applied {} events in last {} seconds",
                    event_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(sleep);
        }
        info!("Gamepad Collector stopped");
    }
}

const AXIS_SLOTS: [(Axis, usize); 6] = [
    (Axis::LeftStickX, axes::LEFT_STICK_X),
    (Axis::LeftStickY, axes::LEFT_STICK_Y),
    (Axis::RightStickX, axes::RIGHT_STICK_X),
    (Axis::RightStickY, axes::RIGHT_STICK_Y),
    (Axis::LeftZ, axes::LEFT_TRIGGER),
    (Axis::RightZ, axes::RIGHT_TRIGGER),
];

const TRIGGER_SLOTS: [(Button, usize); 2] = [
    (Button::LeftTrigger2, axes::LEFT_TRIGGER),
    (Button::RightTrigger2, axes::RIGHT_TRIGGER),
];

fn axis_slot(axis: Axis) -> Option<usize> {
    AXIS_SLOTS
        .iter()
        .find(|(candidate, _)| *candidate == axis)
        .map(|(_, slot)| *slot)
}

fn trigger_slot(button: Button) -> Option<usize> {
    TRIGGER_SLOTS
        .iter()
        .find(|(candidate, _)| *candidate == button)
        .map(|(_, slot)| *slot)
}

// Helper function to map gilrs Button to a snapshot slot
fn button_slot(button: Button) -> Option<usize> {
    match button {
        Button::South => Some(buttons::SOUTH),
        Button::East => Some(buttons::EAST),
        Button::North => Some(buttons::NORTH),
        Button::West => Some(buttons::WEST),
        Button::DPadUp => Some(buttons::DPAD_UP),
        Button::DPadDown => Some(buttons::DPAD_DOWN),
        Button::DPadLeft => Some(buttons::DPAD_LEFT),
        Button::DPadRight => Some(buttons::DPAD_RIGHT),
        Button::Start => Some(buttons::START),
        Button::Select => Some(buttons::SELECT),
        _ => None,
    }
}

/// Spawns the gamepad poller on its own OS thread.
///
/// gilrs is created inside the thread; only the snapshot channel crosses over.
pub fn spawn_collector(
    settings: CollectorSettings,
    snapshot_sender: watch::Sender<Option<DeviceSnapshot>>,
    cancel: CancellationToken,
) -> Result<std::thread::JoinHandle<()>, CollectorError> {
    info!("Spawning Gamepad Collector with settings: {:?}", settings);
    std::thread::Builder::new()
        .name("gamepad-collector".to_string())
        .spawn(move || match GamepadCollector::create(settings, snapshot_sender) {
            Ok(collector) => {
                let mut collecting = collector.initialize();
                collecting.run_collection_loop(cancel);
            }
            Err(e) => {
                error!("Gamepad Collector unavailable, keyboard only: {}", e);
            }
        })
        .map_err(|e| CollectorError::SpawnError(e.to_string()))
}
