use opencockpit::config::{AnimationSettings, GaugeSettings};
use opencockpit::display::GaugeModel;
use opencockpit::network::InboundMessage;
use opencockpit::state::{
    ease_in_out, AnimationController, EngineTransition, StateReconciler, SweepPhase,
};
use rstest::rstest;
use std::time::Duration;

const IDLE_NORM: f64 = 700.0 / 8000.0;

fn controller() -> AnimationController {
    AnimationController::new(&AnimationSettings::default(), IDLE_NORM)
}

#[test]
fn value_at_half_rise_is_ease_midpoint() {
    let mut sweep = controller();
    sweep.start();
    let frame = sweep.advance(Duration::from_millis(350)).unwrap();
    assert!((frame.rpm_norm - ease_in_out(0.5)).abs() < 1e-12);
    assert!((frame.rpm_norm - 0.5).abs() < 1e-12);
    assert_eq!(frame.rpm_norm, frame.speed_frac);
}

#[test]
fn cancel_during_rise_halts_interpolation() {
    let mut sweep = controller();
    sweep.start();
    sweep.advance(Duration::from_millis(200)).unwrap();
    sweep.cancel();
    assert_eq!(sweep.state().phase, SweepPhase::Idle);
    assert_eq!(sweep.advance(Duration::from_millis(16)), None);
    assert_eq!(sweep.advance(Duration::from_millis(1000)), None);
}

#[rstest]
#[case(100)]
#[case(350)]
#[case(600)]
fn rise_is_monotonic(#[case] at_ms: u64) {
    let mut early = controller();
    let mut late = controller();
    early.start();
    late.start();
    let a = early.advance(Duration::from_millis(at_ms)).unwrap();
    let b = late.advance(Duration::from_millis(at_ms + 50)).unwrap();
    assert!(b.rpm_norm > a.rpm_norm);
}

#[test]
fn fall_settles_on_idle_baseline() {
    let mut sweep = controller();
    sweep.start();
    sweep.advance(Duration::from_millis(850));
    let near_end = sweep.advance(Duration::from_millis(599)).unwrap();
    assert!((near_end.rpm_norm - IDLE_NORM).abs() < 0.01);
    assert!(near_end.speed_frac < 0.01);
}

// Engine start rises, holds and falls to idle within rising + holding + falling
#[test]
fn engine_start_sweep_completes_within_total_duration() {
    let mut reconciler = StateReconciler::new();
    let mut sweep = controller();
    let gauges = GaugeModel::new(GaugeSettings::default());

    let message = InboundMessage::decode(r#"{"engine_running":true}"#).unwrap();
    let result = reconciler.apply(&message, &mut sweep);
    assert_eq!(result.engine, Some(EngineTransition::Started));

    let tick = Duration::from_millis(10);
    let mut elapsed = Duration::ZERO;
    let mut peak: f64 = 0.0;
    let mut saw = Vec::new();
    while let Some(frame) = sweep.advance(tick) {
        elapsed += tick;
        peak = peak.max(frame.rpm_norm);
        if saw.last() != Some(&sweep.state().phase) {
            saw.push(sweep.state().phase);
        }
        assert!(elapsed < sweep.duration());
    }
    elapsed += tick;

    assert_eq!(
        saw,
        vec![SweepPhase::Rising, SweepPhase::Holding, SweepPhase::Falling]
    );
    assert_eq!(peak, 1.0);
    assert!(elapsed <= sweep.duration());

    // First frame after completion shows the reconciled idle reading
    let rpm = gauges.rpm(reconciler.state(), None);
    assert!((rpm - 700.0).abs() < 1e-9);
}

#[test]
fn values_received_mid_sweep_show_after_completion() {
    let mut reconciler = StateReconciler::new();
    let mut sweep = controller();
    let gauges = GaugeModel::new(GaugeSettings::default());

    reconciler.apply(
        &InboundMessage::decode(r#"{"engine_running":true}"#).unwrap(),
        &mut sweep,
    );
    let mid = sweep.advance(Duration::from_millis(300));
    reconciler.apply(
        &InboundMessage::decode(r#"{"virtual_rpm":0.25,"speed_pct":12.0}"#).unwrap(),
        &mut sweep,
    );
    assert!(sweep.is_active());
    assert_ne!(gauges.rpm(reconciler.state(), mid), 2000.0);

    let after = sweep.advance(Duration::from_secs(2));
    assert_eq!(after, None);
    assert!((gauges.rpm(reconciler.state(), after) - 2000.0).abs() < 1e-9);
    assert!((gauges.speed_pct(reconciler.state(), after) - 12.0).abs() < 1e-9);
}

#[test]
fn engine_stop_cancels_running_sweep() {
    let mut reconciler = StateReconciler::new();
    let mut sweep = controller();
    reconciler.apply(
        &InboundMessage::decode(r#"{"engine_running":true}"#).unwrap(),
        &mut sweep,
    );
    sweep.advance(Duration::from_millis(100));
    let result = reconciler.apply(
        &InboundMessage::decode(r#"{"engine_running":false}"#).unwrap(),
        &mut sweep,
    );
    assert_eq!(result.engine, Some(EngineTransition::Stopped));
    assert!(!sweep.is_active());
}
