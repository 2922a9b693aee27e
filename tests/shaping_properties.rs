use opencockpit::config::{AxisLayout, ShapingSettings};
use opencockpit::controller::{apply_deadzone, IntentSample, IntentSource, KeyState};
use opencockpit::shaping::{AxisShaper, AxisState};
use proptest::prelude::*;
use rstest::rstest;

const AXIS_MIN: f64 = -50.0;
const AXIS_MAX: f64 = 50.0;

fn keys(throttle: bool, brake: bool) -> IntentSample {
    IntentSample::from_keys(&KeyState {
        throttle,
        brake,
        ..Default::default()
    })
}

fn analog(throttle: f64, brake: f64) -> IntentSample {
    IntentSample {
        throttle,
        brake,
        steer: 0.0,
        source: IntentSource::Analog,
    }
}

fn combined(value: f64) -> AxisState {
    AxisState {
        value,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn throttle_ramp_is_monotonic_and_rate_bounded(
        prior in AXIS_MIN..=AXIS_MAX,
        dt in 0.0f64..0.25,
    ) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        let next = shaper.advance(&keys(true, false), dt, combined(prior));
        prop_assert!(next.value >= prior);
        prop_assert!(next.value - prior <= 140.0 * dt + 1e-9);
        prop_assert!((AXIS_MIN..=AXIS_MAX).contains(&next.value));
    }

    #[test]
    fn brake_ramp_is_monotonic_and_rate_bounded(
        prior in AXIS_MIN..=AXIS_MAX,
        dt in 0.0f64..0.25,
    ) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        let next = shaper.advance(&keys(false, true), dt, combined(prior));
        prop_assert!(next.value <= prior);
        prop_assert!(prior - next.value <= 140.0 * dt + 1e-9);
        prop_assert!((AXIS_MIN..=AXIS_MAX).contains(&next.value));
    }

    #[test]
    fn release_never_crosses_zero(
        prior in AXIS_MIN..=AXIS_MAX,
        dt in 0.0f64..0.25,
    ) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        let next = shaper.advance(&keys(false, false), dt, combined(prior));
        prop_assert!(next.value.abs() <= prior.abs());
        prop_assert!(next.value * prior >= 0.0);
    }

    #[test]
    fn out_of_range_prior_is_clamped(
        prior in -500.0f64..500.0,
        dt in 0.0f64..0.25,
    ) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        let next = shaper.advance(&keys(false, false), dt, combined(prior));
        prop_assert!((AXIS_MIN..=AXIS_MAX).contains(&next.value));
    }

    #[test]
    fn analog_smoothing_converges_without_overshoot(
        start in AXIS_MIN..=AXIS_MAX,
        throttle in 0.0f64..=1.0,
        brake in 0.0f64..=1.0,
        steps in prop::collection::vec(0.001f64..0.1, 1..60),
    ) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        let target = throttle * AXIS_MAX + brake * AXIS_MIN;
        let intent = analog(throttle, brake);
        let mut state = combined(start);
        for dt in steps {
            let next = shaper.advance(&intent, dt, state);
            if state.value <= target {
                prop_assert!(next.value >= state.value - 1e-12);
                prop_assert!(next.value <= target + 1e-9);
            } else {
                prop_assert!(next.value <= state.value + 1e-12);
                prop_assert!(next.value >= target - 1e-9);
            }
            state = next;
        }
    }

    #[test]
    fn deadzone_endpoints(d in 0.0f64..0.99) {
        prop_assert_eq!(apply_deadzone(d, d), 0.0);
        prop_assert_eq!(apply_deadzone(1.0, d), 1.0);
        prop_assert_eq!(apply_deadzone(-1.0, d), -1.0);
    }

    #[test]
    fn wire_frame_is_always_in_range(value in -500.0f64..500.0) {
        let shaper = AxisShaper::new(ShapingSettings::default());
        match shaper.frame(&combined(value)) {
            opencockpit::network::AxisFrame::Combined(v) => prop_assert!((-50..=50).contains(&v)),
            other => prop_assert!(false, "unexpected frame {:?}", other),
        }
    }
}

// Holding the increase key for t seconds at rate r yields min(max, r * t)
#[rstest]
#[case(0.1, 14.0)]
#[case(0.25, 35.0)]
#[case(0.5, 50.0)]
#[case(2.0, 50.0)]
fn held_key_reaches_rate_times_time(#[case] seconds: f64, #[case] expected: f64) {
    let shaper = AxisShaper::new(ShapingSettings::default());
    let dt = 1.0 / 200.0;
    let ticks = (seconds / dt).round() as usize;
    let mut state = AxisState::default();
    for _ in 0..ticks {
        state = shaper.advance(&keys(true, false), dt, state);
    }
    assert!(
        (state.value - expected).abs() < 1e-6,
        "after {}s got {}",
        seconds,
        state.value
    );
}

#[rstest]
#[case(true, false, 14.0, 0.0)]
#[case(false, true, 0.0, 20.0)]
#[case(true, true, 14.0, 20.0)]
fn split_layout_uses_pedal_rates(
    #[case] throttle: bool,
    #[case] brake: bool,
    #[case] accel: f64,
    #[case] brake_value: f64,
) {
    let shaper = AxisShaper::new(ShapingSettings {
        layout: AxisLayout::Split,
        ..Default::default()
    });
    let next = shaper.advance(&keys(throttle, brake), 0.1, AxisState::default());
    assert!((next.accel - accel).abs() < 1e-9);
    assert!((next.brake - brake_value).abs() < 1e-9);
}
