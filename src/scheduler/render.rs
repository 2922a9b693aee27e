//! Render Scheduler - the single loop that owns every console component
//!
//! Each tick runs the same pipeline:
//!
//! ```text
//! sample ─► shape ─► steer ─► paced send ─► retry / probe ─► sweep ─► DisplayFrame
//! ```
//!
//! Channel events and operator actions are handled between ticks on the same
//! task, so no component is ever shared across threads.

use crate::config::ConsoleConfig;
use crate::controller::device::{ControlAction, DeviceSnapshot, KeyState};
use crate::controller::device_adapter::DeviceAdapter;
use crate::controller::ControllerHandle;
use crate::display::{DisplayFrame, DisplaySink, GaugeModel, NoticeBoard};
use crate::network::channel::{
    ChannelEvent, ChannelStats, ChannelUpdate, ConnectionHealth, NetworkChannel, TransportCommand,
};
use crate::network::message::{ControlCommand, Toggle};
use crate::scheduler::pacing::SendPacer;
use crate::shaping::axis_shaper::{AxisShaper, AxisState};
use crate::shaping::steering::SteeringAccumulator;
use crate::state::animation::{AnimationController, SweepFrame};
use crate::state::reconciler::StateReconciler;
use statum::{machine, state};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// Longest step fed into shaping and animation; a stalled loop must not teleport the axes
const MAX_TICK_DT: Duration = Duration::from_millis(250);

/// Every component of the console, owned in one place.
pub struct ConsoleContext {
    pub adapter: DeviceAdapter,
    pub shaper: AxisShaper,
    pub axes: AxisState,
    pub steering: SteeringAccumulator,
    pub channel: NetworkChannel,
    pub reconciler: StateReconciler,
    pub animation: AnimationController,
    pub gauges: GaugeModel,
    pub notices: NoticeBoard,
}

impl ConsoleContext {
    pub fn new(
        config: &ConsoleConfig,
        transport: mpsc::Sender<TransportCommand>,
        epoch: Instant,
    ) -> Self {
        let gauges = GaugeModel::new(config.gauges.clone());
        let animation = AnimationController::new(&config.animation, gauges.idle_rpm_norm());
        Self {
            adapter: DeviceAdapter::new(config.device.clone()),
            shaper: AxisShaper::new(config.shaping.clone()),
            axes: AxisState::default(),
            steering: SteeringAccumulator::new(config.steering.clone()),
            channel: NetworkChannel::new(&config.network, transport, epoch),
            reconciler: StateReconciler::new(),
            animation,
            notices: NoticeBoard::new(&config.gauges),
            gauges,
        }
    }

    /// Neutral controls for a fresh connection.
    fn reset_controls(&mut self) {
        self.axes = AxisState::default();
        self.steering.reset();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub steer_steps_sent: u64,
}

/// Channel counters at one point in time, for per-interval stats lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelMark {
    dropped: usize,
    received: usize,
    malformed: usize,
}

impl ChannelMark {
    fn of(stats: &ChannelStats) -> Self {
        Self {
            dropped: stats.messages_dropped,
            received: stats.messages_received,
            malformed: stats.messages_malformed,
        }
    }

    fn since(&self, earlier: &Self) -> Self {
        Self {
            dropped: self.dropped.saturating_sub(earlier.dropped),
            received: self.received.saturating_sub(earlier.received),
            malformed: self.malformed.saturating_sub(earlier.malformed),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[machine]
pub struct RenderScheduler<S: SchedulerState> {
    context: ConsoleContext,
    pacer: SendPacer,
    display: Box<dyn DisplaySink>,
    last_tick: Option<Instant>,
    last_frame: DisplayFrame,
    stats: SchedulerStats,
    stats_interval: Duration,
    last_stats_at: Option<Instant>,
    channel_mark: ChannelMark,
}

impl<S: SchedulerState> RenderScheduler<S> {
    pub fn context(&self) -> &ConsoleContext {
        &self.context
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl RenderScheduler<Idle> {
    pub fn create(
        config: &ConsoleConfig,
        transport: mpsc::Sender<TransportCommand>,
        display: Box<dyn DisplaySink>,
        epoch: Instant,
    ) -> Self {
        info!("Creating render scheduler at {} Hz", config.scheduler.tick_hz);
        Self::new(
            ConsoleContext::new(config, transport, epoch),
            SendPacer::new(config.network.send_interval()),
            display,
            None,
            DisplayFrame::default(),
            SchedulerStats::default(),
            Duration::from_secs(config.scheduler.stats_interval_s),
            None,
            ChannelMark::default(),
        )
    }

    /// Opens the channel and transitions to Running.
    pub fn start(mut self, now: Instant) -> RenderScheduler<Running> {
        info!("Starting render scheduler");
        self.context.channel.connect(now);
        self.last_stats_at = Some(now);
        self.transition()
    }
}

impl RenderScheduler<Running> {
    pub fn last_frame(&self) -> &DisplayFrame {
        &self.last_frame
    }

    /// One frame of the pipeline. `now` must not go backwards.
    pub fn tick(
        &mut self,
        now: Instant,
        keys: &KeyState,
        device: Option<&DeviceSnapshot>,
    ) -> &DisplayFrame {
        let dt = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).min(MAX_TICK_DT))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        let dt_s = dt.as_secs_f64();
        self.stats.ticks += 1;

        // Sample and shape
        let intent = self.context.adapter.sample(keys, device);
        for action in self.context.adapter.button_actions(device) {
            if self.handle_action(action, now).is_break() {
                debug!("Quit is not a device action, ignoring");
            }
        }
        self.context.axes = self.context.shaper.advance(&intent, dt_s, self.context.axes);

        // Steering: one frame per cadence step while steering, otherwise centre
        if intent.is_steering() {
            if let Some(applied) = self.context.steering.steer(intent.steer, dt_s) {
                self.send_steer_step(applied);
            }
        } else {
            self.context.steering.steer(0.0, dt_s);
            let state = self.context.reconciler.state();
            let (throttle_angle, gear) = (state.throttle_angle, state.gear);
            self.context.steering.auto_return(dt_s, throttle_angle, gear);
        }

        // Paced send, latest value only
        if self.context.channel.state().is_connected() && self.pacer.should_send(now) {
            self.send_drive_frame();
        }
        self.context.channel.poll_retry(now);
        self.context.channel.poll_probe(now);

        let sweep = self.context.animation.advance(dt);
        self.last_frame = self.compose(now, sweep);
        self.display.present(&self.last_frame);

        self.log_stats(now);
        &self.last_frame
    }

    fn send_drive_frame(&mut self) {
        let ctx = &mut self.context;
        let command = ControlCommand::Drive(ctx.shaper.frame(&ctx.axes));
        if ctx.channel.send(&command) {
            self.stats.frames_sent += 1;
        }
    }

    // Steps are never merged or replayed; a dropped step is simply lost
    fn send_steer_step(&mut self, applied_deg: f64) {
        let ctx = &mut self.context;
        if !ctx.channel.state().is_connected() {
            return;
        }
        let Some(step) = ctx.steering.wire_step(applied_deg) else {
            return;
        };
        if ctx.channel.send(&ControlCommand::Steer(step)) {
            self.stats.steer_steps_sent += 1;
        }
    }

    fn compose(
        &mut self,
        now: Instant,
        sweep: Option<SweepFrame>,
    ) -> DisplayFrame {
        let ctx = &mut self.context;
        let state = ctx.reconciler.state();
        let rpm = ctx.gauges.rpm(state, sweep);
        DisplayFrame {
            health: ConnectionHealth {
                state: ctx.channel.state(),
                latency: ctx.channel.latency(),
            },
            engine_running: state.engine_running,
            sweeping: sweep.is_some(),
            rpm,
            rpm_redzone: ctx.gauges.in_redzone(rpm),
            speed_pct: ctx.gauges.speed_pct(state, sweep),
            speed_kmh: state.current_speed_kmh,
            gear_label: ctx.gauges.gear_label(state),
            requested_gear: ctx.reconciler.pending().gear,
            gear_error: ctx.notices.gear_error(now),
            head_on: state.head_on,
            sport_mode_on: state.sport_mode_on,
            esc_armed: state.esc_armed,
            shift_state: state.shift_state.clone(),
            torque_cmd: state.torque_cmd,
            device: ctx.adapter.status(),
            axis: ctx.shaper.display(&ctx.axes),
            steer_angle: ctx.steering.angle(),
            remote_steer_angle: state.steer_angle,
            notices: ctx.notices.active(now),
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent, now: Instant) {
        let ctx = &mut self.context;
        match ctx.channel.handle_event(event, now) {
            ChannelUpdate::Opened => {
                debug!("Fresh connection, resetting steering and axes");
                ctx.reset_controls();
                self.pacer.reset();
            }
            ChannelUpdate::Lost => {}
            ChannelUpdate::Inbound(message) => {
                let result = ctx.reconciler.apply(&message, &mut ctx.animation);
                for notice in result.notices {
                    ctx.notices.push(notice, now);
                }
                if result.shift_fail {
                    ctx.notices.flag_shift_fail(now);
                }
            }
            ChannelUpdate::Nothing => {}
        }
    }

    /// Forwards a discrete operator request. Returns `Break` on quit.
    pub fn handle_action(&mut self, action: ControlAction, _now: Instant) -> ControlFlow<()> {
        let ctx = &mut self.context;
        match action {
            ControlAction::SelectGear(gear) => {
                if ctx.channel.send(&ControlCommand::Gear(gear)) {
                    ctx.reconciler.request_gear(gear);
                } else {
                    debug!("Gear request {} not sent", gear);
                }
            }
            ControlAction::Toggle(toggle) => {
                if ctx.channel.send(&ControlCommand::Toggle(toggle)) {
                    ctx.reconciler.request_toggle(toggle);
                } else {
                    debug!("Toggle {:?} not sent", toggle);
                }
            }
            ControlAction::EngineStop => {
                if ctx.reconciler.state().engine_running {
                    if ctx.channel.send(&ControlCommand::Toggle(Toggle::Engine)) {
                        ctx.reconciler.request_toggle(Toggle::Engine);
                    }
                } else {
                    debug!("Engine stop ignored, engine is not running");
                }
            }
            ControlAction::Quit => {
                info!("Quit requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn log_stats(&mut self, now: Instant) {
        let Some(last) = self.last_stats_at else {
            self.last_stats_at = Some(now);
            return;
        };
        if now.saturating_duration_since(last) < self.stats_interval {
            return;
        }
        let mark = ChannelMark::of(self.context.channel.stats());
        let window = mark.since(&self.channel_mark);
        info!(
            "Console stats: {} ticks, {} frames sent, {} steer steps, {} dropped, {} received, {} malformed in last {} seconds",
            self.stats.ticks,
            self.stats.frames_sent,
            self.stats.steer_steps_sent,
            window.dropped,
            window.received,
            window.malformed,
            now.saturating_duration_since(last).as_secs()
        );
        self.stats = SchedulerStats::default();
        self.channel_mark = mark;
        self.last_stats_at = Some(now);
    }

    /// Drives the scheduler until cancelled or the operator quits.
    pub async fn run(
        mut self,
        inputs: &mut ControllerHandle,
        mut events: mpsc::Receiver<ChannelEvent>,
        tick_period: Duration,
        cancel: CancellationToken,
    ) {
        info!("Starting render loop, tick every {:?}", tick_period);
        let mut interval = tokio::time::interval(tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    let keys = *inputs.keys.borrow();
                    let device = inputs.device.borrow().clone();
                    self.tick(Instant::now(), &keys, device.as_ref());
                }
                Some(event) = events.recv() => {
                    self.handle_event(event, Instant::now());
                }
                Some(action) = inputs.actions.recv() => {
                    if self.handle_action(action, Instant::now()).is_break() {
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
        info!("Render loop stopped");
    }
}
