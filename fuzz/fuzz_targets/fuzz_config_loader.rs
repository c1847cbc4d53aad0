#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    let Ok(cfg) = tacho_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // Anything that validates must also map onto the runtime types.
    let parts = tacho_core::TachoParts::from(&cfg);
    assert!(parts.control.tick_ms >= 1);
    assert!((0..=100).contains(&parts.hold.decay_percent));
});
