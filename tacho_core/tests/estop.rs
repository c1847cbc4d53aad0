use rstest::rstest;
use tacho_core::mocks::RecordingDriver;
use tacho_core::{MotorEvent, RunMode, StopMode, Tacho, TachoState};
use tacho_traits::Command;

fn running_tacho(driver: RecordingDriver) -> Tacho {
    let mut t = Tacho::builder()
        .with_driver(driver)
        .build()
        .expect("build tacho");
    t.set_duty_cycle_sp(60);
    t.set_run(true);
    for k in 1..=10u64 {
        t.tick_at(k * 2_000);
    }
    assert_eq!(t.duty_cycle(), 60);
    t
}

#[rstest]
fn arming_stops_immediately_and_forces_coast() {
    let driver = RecordingDriver::default();
    let mut t = running_tacho(driver.clone());
    t.set_stop_mode(StopMode::Brake);
    let events = t.events();

    assert_eq!(t.estop(), 0);
    t.set_estop(1);
    let token = t.estop();
    assert_ne!(token, 0);

    // no tick needed
    assert_eq!(t.state(), TachoState::Idle);
    assert!(!t.is_running());
    assert_eq!(t.duty_cycle(), 0);
    assert_eq!(t.stop_mode(), StopMode::Coast);
    assert_eq!(driver.last_command(), Some(Command::Coast));

    let got: Vec<_> = events.try_iter().collect();
    assert!(got.contains(&MotorEvent::EstopArmed));
}

#[rstest]
fn run_is_refused_while_armed() {
    let mut t = running_tacho(RecordingDriver::default());
    t.set_estop(0);
    t.set_run(true);
    assert_eq!(t.state(), TachoState::Idle);
    t.tick_at(1_000_000);
    assert!(!t.is_running());
    assert_eq!(t.duty_cycle(), 0);
}

#[rstest]
#[case(1)]
#[case(0x8000_0000)]
#[case(u32::MAX)]
fn wrong_token_is_ignored(#[case] flip: u32) {
    let mut t = running_tacho(RecordingDriver::default());
    t.set_estop(0);
    let token = t.estop();
    t.set_estop(token ^ flip);
    assert_eq!(t.estop(), token);
}

#[rstest]
fn exact_token_disarms_and_allows_restart() {
    let mut t = running_tacho(RecordingDriver::default());
    let events = t.events();
    t.set_estop(0);
    let token = t.estop();
    t.set_estop(token);
    assert_eq!(t.estop(), 0);
    assert!(events.try_iter().any(|e| e == MotorEvent::EstopReleased));

    t.set_run_mode(RunMode::Forever);
    t.set_run(true);
    assert_eq!(t.state(), TachoState::RunForever);
    t.tick_at(10_000_000);
    assert!(t.is_running());
}

#[rstest]
fn rearming_after_release_arms_again() {
    let mut t = running_tacho(RecordingDriver::default());
    t.set_estop(0);
    let first = t.estop();
    t.set_estop(first);
    t.set_estop(0);
    assert_ne!(t.estop(), 0);
}
