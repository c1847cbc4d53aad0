//! Ticker thread lifecycle: the control thread must tick while alive and
//! join cleanly on drop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tacho_core::mocks::RecordingDriver;
use tacho_core::{Tacho, TachoState, Ticker};
use tacho_traits::clock::MonotonicClock;

fn shared() -> Arc<Mutex<Tacho>> {
    let t = Tacho::builder()
        .with_driver(RecordingDriver::default())
        .build()
        .expect("build tacho");
    Arc::new(Mutex::new(t))
}

#[test]
fn ticker_runs_and_publishes_reports() {
    let core = shared();
    {
        let mut t = core.lock().unwrap();
        t.set_duty_cycle_sp(40);
        t.set_run(true);
    }
    let ticker = Ticker::spawn(core.clone(), Duration::from_millis(2), MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(60));

    assert!(ticker.ticks() > 0);
    let report = ticker.latest().expect("at least one report");
    assert!(report.running);
    assert_eq!(report.state, TachoState::RampConst);
    assert_eq!(report.power, 40);
    drop(ticker);

    // the thread is joined; the core is free again
    let t = core.lock().unwrap();
    assert!(t.ticks() > 0);
}

#[test]
fn ticker_thread_exits_on_drop() {
    let core = shared();
    let ticker = Ticker::spawn(core.clone(), Duration::from_millis(5), MonotonicClock::new());
    std::thread::sleep(Duration::from_millis(20));
    drop(ticker);

    let after = core.lock().unwrap().ticks();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(core.lock().unwrap().ticks(), after, "ticks advanced after drop");
}

#[test]
fn multiple_tickers_dont_leak_threads() {
    for _ in 0..10 {
        let core = shared();
        let ticker = Ticker::spawn(core, Duration::from_millis(1), MonotonicClock::new());
        std::thread::sleep(Duration::from_millis(5));
        let _ = ticker.latest();
        ticker.stop();
    }
}
