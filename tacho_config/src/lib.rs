#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the tacho motor controller.
//!
//! - `Config` and its sections are deserialized from TOML; every section is
//!   optional and falls back to the tuned defaults.
//! - `Config::validate` rejects out-of-range values with
//!   `section.field must be ...` messages.
use serde::Deserialize;

/// Motor type identifiers understood by the static model lookup.
pub const KNOWN_MODELS: [&str; 4] = ["lego-ev3-l", "lego-ev3-m", "large", "medium"];

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    /// Motor type id, e.g. "lego-ev3-l" (large) or "lego-ev3-m" (medium).
    pub model: String,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            model: "lego-ev3-l".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Fixed control tick period in milliseconds.
    pub tick_ms: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { tick_ms: 2 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DecoderCfg {
    /// Edges closer than this are treated as contact bounce (µs).
    pub min_pulse_interval_us: u64,
    /// Above this speed (percent of model max rate) pin levels are not trusted.
    pub high_speed_percent: u32,
}

impl Default for DecoderCfg {
    fn default() -> Self {
        Self {
            min_pulse_interval_us: 400,
            high_speed_percent: 35,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RampCfg {
    /// How far the down window is pushed out when a position move falls short (ms).
    pub nudge_ms: i32,
    /// Down-window end used by run-forever until a stop is requested (ms).
    pub forever_horizon_ms: i32,
}

impl Default for RampCfg {
    fn default() -> Self {
        Self {
            nudge_ms: 100,
            forever_horizon_ms: 3_600_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpeedPidCfg {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
    /// Output divisor applied after the weighted sum.
    pub kf: i32,
}

impl Default for SpeedPidCfg {
    fn default() -> Self {
        Self {
            kp: 1000,
            ki: 60,
            kd: 0,
            kf: 9000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HoldCfg {
    pub kp: i32,
    /// Integral retained per tick, in percent.
    pub decay_percent: i32,
    pub kd: i32,
}

impl Default for HoldCfg {
    fn default() -> Self {
        Self {
            kp: 400,
            decay_percent: 99,
            kd: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// First-order lag of the simulated motor while driven (ms).
    pub time_constant_ms: u32,
    /// Spin-down lag while coasting (ms).
    pub coast_time_constant_ms: u32,
    /// Spin-down lag while braking (ms).
    pub brake_time_constant_ms: u32,
    /// Free-running speed at 100% duty, in percent of the model max rate.
    pub free_speed_percent: u32,
    /// Inject a contact-bounce glitch every N pulses (0 disables).
    pub glitch_every: u32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            time_constant_ms: 60,
            coast_time_constant_ms: 250,
            brake_time_constant_ms: 25,
            free_speed_percent: 110,
            glitch_every: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    /// Encoder interrupt line (BCM numbering).
    pub encoder_int: u8,
    /// Encoder direction line.
    pub encoder_dir: u8,
    /// H-bridge input 1 (PWM while running forward).
    pub bridge_in1: u8,
    /// H-bridge input 2 (PWM while running reverse).
    pub bridge_in2: u8,
    #[serde(default = "default_pwm_hz")]
    pub pwm_hz: f64,
}

const fn default_pwm_hz() -> f64 {
    1000.0
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EstopCfg {
    /// Arm the emergency stop on Ctrl-C; when false Ctrl-C requests a ramped stop.
    pub on_interrupt: bool,
}

impl Default for EstopCfg {
    fn default() -> Self {
        Self { on_interrupt: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Upper bound on a single move before the runner gives up (ms).
    pub max_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { max_ms: 60_000 }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub motor: MotorCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub decoder: DecoderCfg,
    #[serde(default)]
    pub ramp: RampCfg,
    #[serde(default)]
    pub speed_pid: SpeedPidCfg,
    #[serde(default)]
    pub hold: HoldCfg,
    #[serde(default)]
    pub sim: SimCfg,
    /// GPIO wiring; only required by hardware builds.
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub estop: EstopCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Motor
        if !KNOWN_MODELS.contains(&self.motor.model.as_str()) {
            eyre::bail!(
                "motor.model must be one of {}, got '{}'",
                KNOWN_MODELS.join(", "),
                self.motor.model
            );
        }

        // Control
        if self.control.tick_ms == 0 {
            eyre::bail!("control.tick_ms must be >= 1");
        }
        if self.control.tick_ms > 100 {
            eyre::bail!("control.tick_ms must be <= 100");
        }

        // Decoder
        if self.decoder.min_pulse_interval_us == 0 {
            eyre::bail!("decoder.min_pulse_interval_us must be >= 1");
        }
        if self.decoder.high_speed_percent == 0 || self.decoder.high_speed_percent > 100 {
            eyre::bail!("decoder.high_speed_percent must be in [1, 100]");
        }

        // Ramp
        if self.ramp.nudge_ms <= 0 {
            eyre::bail!("ramp.nudge_ms must be >= 1");
        }
        if self.ramp.forever_horizon_ms <= 0 {
            eyre::bail!("ramp.forever_horizon_ms must be >= 1");
        }

        // Speed PID
        if self.speed_pid.kp < 0 || self.speed_pid.ki < 0 || self.speed_pid.kd < 0 {
            eyre::bail!("speed_pid gains must be >= 0");
        }
        if self.speed_pid.kf <= 0 {
            eyre::bail!("speed_pid.kf must be >= 1");
        }

        // Hold
        if self.hold.kp < 0 || self.hold.kd < 0 {
            eyre::bail!("hold gains must be >= 0");
        }
        if !(0..=100).contains(&self.hold.decay_percent) {
            eyre::bail!("hold.decay_percent must be in [0, 100]");
        }

        // Sim
        if self.sim.time_constant_ms == 0
            || self.sim.coast_time_constant_ms == 0
            || self.sim.brake_time_constant_ms == 0
        {
            eyre::bail!("sim time constants must be >= 1");
        }
        if self.sim.free_speed_percent == 0 || self.sim.free_speed_percent > 200 {
            eyre::bail!("sim.free_speed_percent must be in [1, 200]");
        }

        // Pins
        if let Some(p) = &self.pins {
            let all = [p.encoder_int, p.encoder_dir, p.bridge_in1, p.bridge_in2];
            for (i, a) in all.iter().enumerate() {
                if all[i + 1..].contains(a) {
                    eyre::bail!("pins must be distinct (pin {a} used twice)");
                }
            }
            if !(p.pwm_hz.is_finite() && p.pwm_hz > 0.0) {
                eyre::bail!("pins.pwm_hz must be > 0");
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Runner
        if self.runner.max_ms == 0 {
            eyre::bail!("runner.max_ms must be >= 1");
        }

        Ok(())
    }
}
