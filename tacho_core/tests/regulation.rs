use proptest::prelude::*;
use tacho_core::mocks::RecordingDriver;
use tacho_core::pid::SpeedRegulator;
use tacho_core::{PidGains, RegulationMode, Tacho, TachoState};

const MAX_PPS: i32 = 900;

fn windup_bound(err: i32, g: PidGains) -> i32 {
    100 + err.abs() * g.ki / g.kf + 1
}

proptest! {
    // Out-of-range setpoints clamp to the model max; with the motor stuck at
    // a constant speed the integral must not run away.
    #[test]
    fn stuck_motor_never_winds_up(
        speed in 0i32..=MAX_PPS,
        setpoint in 1_000i32..100_000,
        reverse in any::<bool>(),
        steps in 1usize..2_000,
    ) {
        let g = PidGains::default();
        let sign = if reverse { -1 } else { 1 };
        let mut pid = SpeedRegulator::new(g);
        pid.set_target(sign * setpoint);
        let speed = sign * speed;
        let err = sign * MAX_PPS - speed;
        for _ in 0..steps {
            let p = pid.step(speed, MAX_PPS);
            prop_assert!(p.abs() <= windup_bound(err, g), "power {} err {}", p, err);
        }
    }
}

#[test]
fn regulated_run_with_stuck_motor_stays_bounded() {
    let mut t = Tacho::builder()
        .with_driver(RecordingDriver::default())
        .build()
        .expect("build tacho");
    t.set_regulation_mode(RegulationMode::On);
    t.set_speed_sp(10_000);
    t.set_run(true);

    let decoder = t.decoder();
    let g = t.gains();
    t.tick_at(2_000);
    for k in 2..=2_000u64 {
        // constant 500 pps
        decoder.on_edge(true, true, k * 2_000);
        t.tick_at(k * 2_000 + 1);
        let err = MAX_PPS - t.speed();
        assert!(
            t.regulator_power() <= windup_bound(err, g),
            "tick {k}: power {} speed {}",
            t.regulator_power(),
            t.speed()
        );
        assert!(t.duty_cycle() <= 100);
    }
    assert_eq!(t.state(), TachoState::RampConst);
    assert_eq!(t.speed(), 499);
}

#[test]
fn zero_speed_setpoint_keeps_output_off() {
    let mut t = Tacho::builder()
        .with_driver(RecordingDriver::default())
        .build()
        .expect("build tacho");
    t.set_regulation_mode(RegulationMode::On);
    t.set_speed_sp(0);
    t.set_run(true);
    for k in 1..=50u64 {
        t.tick_at(k * 2_000);
    }
    assert!(t.is_running());
    assert_eq!(t.duty_cycle(), 0);
    assert_eq!(t.regulator_power(), 0);
}

#[test]
fn gains_clamp_negative_and_reset_restores_built_values() {
    let gains = PidGains { kp: 800, ki: 40, kd: 5, kf: 8_000 };
    let mut t = Tacho::builder()
        .with_driver(RecordingDriver::default())
        .with_gains(gains)
        .build()
        .expect("build tacho");
    assert_eq!(t.gains(), gains);
    t.set_kp(-3);
    t.set_ki(70);
    assert_eq!(t.gains().kp, 0);
    assert_eq!(t.gains().ki, 70);
    t.reset();
    assert_eq!(t.gains(), gains);
}
