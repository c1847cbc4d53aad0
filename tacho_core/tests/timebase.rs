use std::time::Duration;

use tacho_core::Tacho;
use tacho_core::mocks::RecordingDriver;
use tacho_traits::clock::test_clock::TestClock;

fn tacho_on(clock: &TestClock) -> Tacho {
    Tacho::builder()
        .with_driver(RecordingDriver::default())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build tacho")
}

#[test]
fn edges_and_ticks_share_the_injected_clock() {
    let clock = TestClock::new();
    let mut t = tacho_on(&clock);
    let decoder = t.decoder();

    for _ in 0..20 {
        clock.advance(Duration::from_millis(2));
        decoder.on_edge(true, true, t.timebase().now_us());
        t.tick();
    }
    assert_eq!(t.timebase().now_us(), 40_000);
    assert_eq!(t.position(), 20);
    assert_eq!(t.speed(), 499);

    // no edges for longer than one pulse period of the slowest band
    clock.advance(Duration::from_millis(150));
    t.tick();
    assert_eq!(t.speed(), 0);
    assert_eq!(t.position(), 20);
}
