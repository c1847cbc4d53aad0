//! Open-loop ramp scenarios driven tick by tick without a plant.

use rstest::rstest;
use tacho_core::mocks::RecordingDriver;
use tacho_core::{ControlCfg, RegulationMode, RunMode, StopMode, Tacho, TachoState};
use tacho_traits::Command;

const TICK_US: u64 = 2_000;

fn tacho(driver: RecordingDriver) -> Tacho {
    Tacho::builder()
        .with_driver(driver)
        .with_control(ControlCfg { tick_ms: 2 })
        .build()
        .expect("build tacho")
}

/// Run `n` ticks on the 2 ms grid starting after tick `from`.
fn run_ticks(t: &mut Tacho, from: u64, n: u64) -> u64 {
    for k in from + 1..=from + n {
        t.tick_at(k * TICK_US);
    }
    from + n
}

#[test]
fn early_ramp_reports_the_open_loop_floor() {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    t.set_duty_cycle_sp(50);
    t.set_ramp_up_sp(500);
    t.set_run(true);

    for k in 1..=40u64 {
        t.tick_at(k * TICK_US);
        let duty = driver.last_duty().map_or(0, i32::from);
        assert_eq!(t.duty_cycle(), duty, "tick {k}");
    }
    assert_eq!(t.duty_cycle(), 10);
}

#[rstest]
#[case(RegulationMode::Off, -10)]
#[case(RegulationMode::On, -4)]
fn hold_output_follows_regulation_floor(#[case] regulation: RegulationMode, #[case] want: i32) {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    t.set_stop_mode(StopMode::Hold);
    t.set_regulation_mode(regulation);
    t.tick_at(TICK_US);
    assert_eq!(t.duty_cycle(), 0);

    // one pulse of drift: P -400, I -1, D -4
    t.decoder().on_edge(true, true, 4 * TICK_US);
    t.tick_at(5 * TICK_US);
    assert_eq!(t.duty_cycle(), want);
    assert_eq!(driver.last_duty(), Some(want.unsigned_abs() as u8));
}

#[test]
fn run_forever_reaches_half_then_full_power() {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    t.set_duty_cycle_sp(50);
    t.set_ramp_up_sp(500);
    t.set_run(true);

    let k = run_ticks(&mut t, 0, 125);
    assert_eq!(t.state(), TachoState::RampUp);
    assert_eq!(t.ramp().count, 248);
    assert_eq!(t.ramp_percent(), 49);
    assert_eq!(t.duty_cycle(), 24);

    let k = run_ticks(&mut t, k, 125);
    assert_eq!(t.ramp().count, 498);
    assert_eq!(t.ramp_percent(), 100);
    assert_eq!(t.duty_cycle(), 50);
    assert_eq!(driver.last_duty(), Some(50));

    run_ticks(&mut t, k, 100);
    assert_eq!(t.state(), TachoState::RampConst);
    assert_eq!(t.duty_cycle(), 50);
    assert!(t.is_running());
}

#[test]
fn setup_tick_does_not_advance_ramp_time() {
    let mut t = tacho(RecordingDriver::default());
    t.set_duty_cycle_sp(80);
    t.set_ramp_up_sp(100);
    t.set_run(true);
    assert_eq!(t.state(), TachoState::RunForever);

    t.tick_at(TICK_US);
    assert_eq!(t.state(), TachoState::RampUp);
    assert_eq!(t.ramp().count, 0);
    t.tick_at(2 * TICK_US);
    assert_eq!(t.ramp().count, 2);
}

#[test]
fn timed_move_runs_full_trapezoid_and_idles() {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    let events = t.events();
    t.set_run_mode(RunMode::Time);
    t.set_duty_cycle_sp(-60);
    t.set_time_sp(400);
    t.set_ramp_up_sp(100);
    t.set_ramp_down_sp(100);
    t.set_run(true);

    let mut seen = Vec::new();
    let mut k = 0;
    while t.is_running() && k < 1_000 {
        k += 1;
        let r = t.tick_at(k * TICK_US);
        if seen.last() != Some(&r.state) {
            seen.push(r.state);
        }
    }
    assert_eq!(
        seen,
        vec![
            TachoState::RampUp,
            TachoState::RampConst,
            TachoState::RampDown,
            TachoState::Idle
        ]
    );
    // 400 ms of ramp time plus the setup tick
    assert_eq!(k, 201);
    assert_eq!(t.duty_cycle(), 0);
    assert_eq!(driver.last_command(), Some(Command::Coast));
    assert!(matches!(
        events.try_recv(),
        Ok(tacho_core::MotorEvent::StateChanged { state: TachoState::Idle, .. })
    ));
}

#[test]
fn negative_duty_drives_reverse_power() {
    let mut t = tacho(RecordingDriver::default());
    t.set_duty_cycle_sp(-40);
    t.set_run(true);
    run_ticks(&mut t, 0, 3);
    assert_eq!(t.duty_cycle(), -40);
}

#[test]
fn cancel_ramps_down_from_current_percent() {
    let mut t = tacho(RecordingDriver::default());
    t.set_duty_cycle_sp(100);
    t.set_ramp_up_sp(400);
    t.set_ramp_down_sp(400);
    t.set_run(true);
    // halfway up the ramp
    let k = run_ticks(&mut t, 0, 101);
    assert_eq!(t.ramp_percent(), 50);

    t.set_run(false);
    assert_eq!(t.state(), TachoState::RampDown);
    assert_eq!(t.ramp().down.end - t.ramp().down.start, 200);

    let mut k = k;
    let mut last = t.duty_cycle();
    while t.is_running() {
        k += 1;
        t.tick_at(k * TICK_US);
        assert!(t.duty_cycle() <= last, "power rose while ramping down");
        last = t.duty_cycle();
    }
    assert_eq!(t.state(), TachoState::Idle);
    // ramp down took about 100 ticks, never a hard stop
    assert!(k >= 101 + 99, "stopped after {k} ticks");
}

#[test]
fn cancel_before_first_tick_stops_without_moving() {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    t.set_duty_cycle_sp(70);
    t.set_run(true);
    t.set_run(false);
    assert_eq!(t.state(), TachoState::Stop);
    t.tick_at(TICK_US);
    assert_eq!(t.state(), TachoState::Idle);
    assert!(!t.is_running());
    assert_eq!(t.duty_cycle(), 0);
}

#[rstest]
#[case(StopMode::Coast, Command::Coast)]
#[case(StopMode::Brake, Command::Brake)]
fn stopped_motor_reasserts_stop_command(#[case] mode: StopMode, #[case] want: Command) {
    let driver = RecordingDriver::default();
    let mut t = tacho(driver.clone());
    t.set_stop_mode(mode);
    driver.clear();
    run_ticks(&mut t, 0, 3);
    let commands: Vec<_> = driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, tacho_core::mocks::DriverCall::Command(_)))
        .collect();
    assert_eq!(commands.len(), 3);
    assert_eq!(driver.last_command(), Some(want));
}

#[test]
fn set_run_while_active_keeps_move() {
    let mut t = tacho(RecordingDriver::default());
    t.set_duty_cycle_sp(30);
    t.set_run(true);
    run_ticks(&mut t, 0, 5);
    t.set_run(true);
    assert_eq!(t.state(), TachoState::RampConst);
    assert!(t.is_running());
}
