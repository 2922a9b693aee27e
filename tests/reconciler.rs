use opencockpit::config::AnimationSettings;
use opencockpit::network::{Gear, InboundMessage, Toggle};
use opencockpit::state::{AnimationController, StateField, StateReconciler};
use rstest::{fixture, rstest};

#[fixture]
fn sweep() -> AnimationController {
    AnimationController::new(&AnimationSettings::default(), 0.0875)
}

fn msg(json: &str) -> InboundMessage {
    InboundMessage::decode(json).unwrap()
}

// A message without `gear` leaves the reconciled gear unchanged
#[rstest]
fn absent_gear_keeps_previous_value(mut sweep: AnimationController) {
    let mut reconciler = StateReconciler::new();
    reconciler.apply(&msg(r#"{"gear":"D","virtual_gear":2}"#), &mut sweep);
    let result = reconciler.apply(&msg(r#"{"speed_pct":40.0,"head_on":true}"#), &mut sweep);

    assert_eq!(reconciler.state().gear, Gear::D);
    assert_eq!(reconciler.state().virtual_gear, Some(2));
    assert!(!result.touched(StateField::Gear));
    assert!(result.touched(StateField::SpeedPct));
    assert!(result.touched(StateField::HeadOn));
}

#[rstest]
#[case(r#"{"engine_running":true}"#, StateField::EngineRunning)]
#[case(r#"{"gear":"R"}"#, StateField::Gear)]
#[case(r#"{"sport_mode_on":true}"#, StateField::SportModeOn)]
#[case(r#"{"esc_armed":true}"#, StateField::EscArmed)]
#[case(r#"{"shift_state":"SHIFTING"}"#, StateField::ShiftState)]
#[case(r#"{"torque_cmd":-12.5}"#, StateField::TorqueCmd)]
#[case(r#"{"virtual_rpm":0.4}"#, StateField::RpmNorm)]
#[case(r#"{"steer_angle":-7.0}"#, StateField::SteerAngle)]
#[case(r#"{"motor_angle":140.0}"#, StateField::ThrottleAngle)]
#[case(r#"{"current_speed_kmh":3.2}"#, StateField::CurrentSpeedKmh)]
fn single_field_updates_touch_only_that_field(
    mut sweep: AnimationController,
    #[case] json: &str,
    #[case] field: StateField,
) {
    let mut reconciler = StateReconciler::new();
    let result = reconciler.apply(&msg(json), &mut sweep);
    assert_eq!(result.changed, vec![field]);
}

#[rstest]
fn rpm_is_clamped_to_unit_range(mut sweep: AnimationController) {
    let mut reconciler = StateReconciler::new();
    reconciler.apply(&msg(r#"{"rpm_norm":1.7}"#), &mut sweep);
    assert_eq!(reconciler.state().rpm_norm, Some(1.0));
}

#[rstest]
fn local_toggle_request_does_not_change_engine_state(mut sweep: AnimationController) {
    let mut reconciler = StateReconciler::new();
    reconciler.request_toggle(Toggle::Engine);
    assert!(!reconciler.state().engine_running);
    assert!(!sweep.is_active());

    reconciler.apply(&msg(r#"{"engine_running":false}"#), &mut sweep);
    assert!(reconciler.pending().toggles.is_empty());
    assert!(!sweep.is_active());
}

#[rstest]
fn confirmation_settles_only_matching_toggle(mut sweep: AnimationController) {
    let mut reconciler = StateReconciler::new();
    reconciler.request_toggle(Toggle::Head);
    reconciler.request_toggle(Toggle::SportMode);
    reconciler.apply(&msg(r#"{"head_on":false}"#), &mut sweep);

    assert!(!reconciler.pending().toggles.contains(&Toggle::Head));
    assert!(reconciler.pending().toggles.contains(&Toggle::SportMode));
}

#[rstest]
fn hints_arrive_engine_stop_first(mut sweep: AnimationController) {
    let mut reconciler = StateReconciler::new();
    let result = reconciler.apply(
        &msg(r#"{"brake_hint":"Hold brake","engine_stop_hint":"Shift to P first"}"#),
        &mut sweep,
    );
    assert_eq!(
        result.notices,
        vec!["Shift to P first".to_string(), "Hold brake".to_string()]
    );
    assert!(result.changed.is_empty());
}
