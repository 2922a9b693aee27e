use opencockpit::config::ConsoleConfig;
use opencockpit::controller::{ControlAction, DeviceStatus, KeyState};
use opencockpit::display::{DisplayFrame, DisplaySink};
use opencockpit::network::{ChannelEvent, ConnectionState, Gear, Toggle, TransportCommand};
use opencockpit::scheduler::RenderScheduler;
use opencockpit::scheduler::render::Running;
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct RecordingDisplay {
    frames: Arc<Mutex<Vec<DisplayFrame>>>,
}

impl DisplaySink for RecordingDisplay {
    fn present(&mut self, frame: &DisplayFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

struct Harness {
    scheduler: RenderScheduler<Running>,
    commands: mpsc::Receiver<TransportCommand>,
    display: RecordingDisplay,
    t0: Instant,
}

impl Harness {
    fn new() -> Self {
        let (tx, commands) = mpsc::channel(8);
        let display = RecordingDisplay::default();
        let t0 = Instant::now();
        let scheduler =
            RenderScheduler::create(&ConsoleConfig::default(), tx, Box::new(display.clone()), t0)
                .start(t0);
        Self {
            scheduler,
            commands,
            display,
            t0,
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn open(&mut self, ms: u64) -> mpsc::Receiver<String> {
        let (writer, frames) = mpsc::channel(64);
        let now = self.at(ms);
        self.scheduler.handle_event(ChannelEvent::Opened(writer), now);
        frames
    }

    fn inbound(&mut self, ms: u64, json: &str) {
        let now = self.at(ms);
        self.scheduler
            .handle_event(ChannelEvent::Frame(json.to_string()), now);
    }

    fn action(&mut self, ms: u64, action: ControlAction) -> ControlFlow<()> {
        let now = self.at(ms);
        self.scheduler.handle_action(action, now)
    }

    fn close(&mut self, ms: u64) {
        let now = self.at(ms);
        self.scheduler.handle_event(ChannelEvent::Closed(None), now);
    }

    fn tick(&mut self, ms: u64, keys: KeyState) -> DisplayFrame {
        let now = self.at(ms);
        self.scheduler.tick(now, &keys, None).clone()
    }
}

fn drain(frames: &mut mpsc::Receiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(text) = frames.try_recv() {
        out.push(serde_json::from_str(&text).unwrap());
    }
    out
}

fn throttle() -> KeyState {
    KeyState {
        throttle: true,
        ..Default::default()
    }
}

#[test]
fn start_requests_a_connection() {
    let mut h = Harness::new();
    assert_eq!(h.commands.try_recv().ok(), Some(TransportCommand::Connect));
    assert_eq!(
        h.scheduler.context().channel.state(),
        ConnectionState::Connecting
    );
}

#[test]
fn axis_frames_are_paced_and_carry_latest_value() {
    let mut h = Harness::new();
    let mut frames = h.open(0);
    for i in 0..=10 {
        h.tick(i * 10, throttle());
    }

    let sent = drain(&mut frames);
    let axes: Vec<i64> = sent
        .iter()
        .filter_map(|frame| frame.get("axis").and_then(Value::as_i64))
        .collect();
    assert_eq!(axes, vec![0, 10]);

    let probes = sent.iter().filter(|frame| frame.get("ping").is_some()).count();
    assert_eq!(probes, 1);
    assert_eq!(h.scheduler.last_frame().axis.readout, 14);
}

#[test]
fn nothing_is_sent_while_disconnected() {
    let mut h = Harness::new();
    h.tick(0, throttle());
    h.tick(100, throttle());
    assert_eq!(h.scheduler.context().channel.stats().messages_sent, 0);
    assert_eq!(h.scheduler.stats().frames_sent, 0);
}

#[test]
fn steering_step_goes_out_on_its_own_frame() {
    let mut h = Harness::new();
    let mut frames = h.open(0);
    let right = KeyState {
        steer_right: true,
        ..Default::default()
    };
    h.tick(0, right);

    let sent = drain(&mut frames);
    assert_eq!(sent[0], serde_json::json!({"steer_delta": 3}));
    assert_eq!(h.scheduler.last_frame().steer_angle, 3.0);

    // Released: drive frames stay axis-only
    h.tick(70, KeyState::default());
    let sent = drain(&mut frames);
    assert!(sent
        .iter()
        .filter(|frame| frame.get("axis").is_some())
        .all(|frame| frame.get("steer_delta").is_none()));
}

#[test]
fn reconnect_resets_steering_and_axes() {
    let mut h = Harness::new();
    let _frames = h.open(0);
    let held = KeyState {
        throttle: true,
        steer_left: true,
        ..Default::default()
    };
    for i in 0..=10 {
        h.tick(i * 10, held);
    }
    assert!(h.scheduler.last_frame().steer_angle < 0.0);
    assert!(h.scheduler.last_frame().axis.readout > 0);

    h.close(110);
    // Steering survives a mere disconnect
    assert!(h.scheduler.context().steering.angle() < 0.0);

    let mut frames = h.open(1200);
    let frame = h.tick(1200, KeyState::default());
    assert_eq!(frame.steer_angle, 0.0);
    assert_eq!(frame.axis.readout, 0);
    let sent = drain(&mut frames);
    assert_eq!(sent[0]["axis"], 0);
}

#[test]
fn engine_stop_is_only_forwarded_while_running() {
    let mut h = Harness::new();
    let mut frames = h.open(0);

    assert_eq!(
        h.action(10, ControlAction::EngineStop),
        ControlFlow::Continue(())
    );
    assert!(drain(&mut frames).is_empty());

    h.inbound(20, r#"{"engine_running":true}"#);
    h.action(30, ControlAction::EngineStop);
    let sent = drain(&mut frames);
    assert_eq!(sent, vec![serde_json::json!({"engine_toggle": true})]);
}

#[test]
fn gear_request_is_sent_but_display_follows_confirmation() {
    let mut h = Harness::new();
    let mut frames = h.open(0);
    h.tick(0, KeyState::default());
    drain(&mut frames);

    h.action(10, ControlAction::SelectGear(Gear::D));
    assert_eq!(drain(&mut frames), vec![serde_json::json!({"gear": "D"})]);

    let frame = h.tick(20, KeyState::default());
    assert_eq!(frame.gear_label, "P");
    assert_eq!(frame.requested_gear, Some(Gear::D));

    h.inbound(30, r#"{"gear":"D","virtual_gear":1}"#);
    let frame = h.tick(40, KeyState::default());
    assert_eq!(frame.gear_label, "1");
    assert_eq!(frame.requested_gear, None);
}

#[test]
fn quit_breaks_the_loop() {
    let mut h = Harness::new();
    assert!(h.action(0, ControlAction::Quit).is_break());
}

#[test]
fn engine_start_drives_the_sweep_on_the_display() {
    let mut h = Harness::new();
    let _frames = h.open(0);
    h.tick(0, KeyState::default());
    h.inbound(10, r#"{"engine_running":true,"virtual_rpm":0.1}"#);

    let rising = h.tick(360, KeyState::default());
    assert!(rising.sweeping);
    assert!(rising.engine_running);
    assert!(rising.rpm > 800.0);

    // Ticks are capped at 250 ms; walk past the end of the sweep
    let mut ms = 360;
    let mut frame = rising;
    while frame.sweeping {
        ms += 100;
        frame = h.tick(ms, KeyState::default());
        assert!(ms < 3000);
    }
    assert!((frame.rpm - 800.0).abs() < 1e-9);
}

#[test]
fn hints_show_as_expiring_notices() {
    let mut h = Harness::new();
    let _frames = h.open(0);
    h.inbound(0, r#"{"brake_hint":"Hold the brake to shift","shift_fail":true}"#);

    let frame = h.tick(100, KeyState::default());
    assert_eq!(frame.notices, vec!["Hold the brake to shift".to_string()]);
    assert!(frame.gear_error);

    let frame = h.tick(2300, KeyState::default());
    assert!(frame.notices.is_empty());
    assert!(!frame.gear_error);
}

#[test]
fn malformed_inbound_is_counted_and_ignored() {
    let mut h = Harness::new();
    let _frames = h.open(0);
    h.inbound(0, r#"{"engine_running":"maybe"}"#);
    h.inbound(1, "not json at all");

    let context = h.scheduler.context();
    assert_eq!(context.channel.stats().messages_malformed, 2);
    assert_eq!(context.channel.state(), ConnectionState::Connected);
    assert!(!context.reconciler.state().engine_running);
}

#[test]
fn display_sink_sees_every_tick() {
    let mut h = Harness::new();
    for i in 0..5 {
        h.tick(i * 16, KeyState::default());
    }
    assert_eq!(h.display.frames.lock().unwrap().len(), 5);
}

#[test]
fn held_steering_sends_one_bounded_step_per_cadence() {
    let mut h = Harness::new();
    let mut frames = h.open(0);
    let max_delta = ConsoleConfig::default().steering.max_delta_deg;
    let right = KeyState {
        steer_right: true,
        ..Default::default()
    };

    // One second at 60 Hz
    for i in 0..60u64 {
        h.tick(i * 1000 / 60, right);
    }

    let sent = drain(&mut frames);
    let deltas: Vec<i64> = sent
        .iter()
        .filter_map(|frame| frame.get("steer_delta").and_then(Value::as_i64))
        .collect();
    assert!(!deltas.is_empty());
    assert!(deltas.iter().all(|d| (*d as f64).abs() <= max_delta), "{:?}", deltas);
    assert!(deltas.iter().all(|d| *d == 3), "{:?}", deltas);

    // Steps stop at the lock and the remote sees exactly the local angle
    let angle = h.scheduler.last_frame().steer_angle;
    assert_eq!(angle, 45.0);
    assert_eq!(deltas.iter().sum::<i64>(), 45);

    // Steering frames never carry axes
    assert!(sent
        .iter()
        .filter(|frame| frame.get("steer_delta").is_some())
        .all(|frame| frame.get("axis").is_none()));
}

#[test]
fn unsent_requests_are_not_highlighted() {
    let mut h = Harness::new();
    h.action(0, ControlAction::SelectGear(Gear::D));
    h.action(0, ControlAction::Toggle(Toggle::Head));

    let frame = h.tick(10, KeyState::default());
    assert_eq!(frame.requested_gear, None);
    assert!(h.scheduler.context().reconciler.pending().toggles.is_empty());
    assert_eq!(h.scheduler.context().channel.stats().messages_dropped, 2);
}

#[test]
fn frame_reports_missing_device() {
    let mut h = Harness::new();
    let frame = h.tick(0, KeyState::default());
    assert_eq!(frame.device, DeviceStatus::Absent);
}
