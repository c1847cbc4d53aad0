//! Simulated DC motor with an incremental encoder.
//!
//! `SimulatedMotor` is the output side (implements `MotorDriver`) and
//! `SimulatedEncoder` the input side: it integrates a first-order speed model
//! and emits edges into any `EdgeSink`. Both share one `Plant`.

use std::sync::{Arc, Mutex};

use tacho_traits::{BoxError, Command, EdgeSink, MotorDriver, Polarity};

use crate::error::HwError;

/// Integration step for the plant model (µs).
const SUBSTEP_US: u64 = 100;
/// Spacing of the two spurious edges that make up a bounce glitch (µs).
const GLITCH_SPACING_US: u64 = 15;
/// Bounce is only injected on slow edges, below this fraction of free speed.
const GLITCH_MAX_SPEED_RATIO: f64 = 0.3;

/// Physical parameters of the simulated motor.
#[derive(Debug, Clone, Copy)]
pub struct PlantParams {
    /// Pulses per second reached at 100% duty once settled.
    pub free_pps: f64,
    pub run_tau_ms: f64,
    pub coast_tau_ms: f64,
    pub brake_tau_ms: f64,
    /// Emit a bounce glitch after every N-th slow pulse; 0 disables.
    pub glitch_every: u32,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            free_pps: 990.0,
            run_tau_ms: 60.0,
            coast_tau_ms: 250.0,
            brake_tau_ms: 25.0,
            glitch_every: 0,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    polarity: Polarity,
    command: Command,
    duty: u8,
    speed_pps: f64,
    position: f64,
    last_pulse: i64,
    int_level: bool,
    now_us: u64,
    pulses: u64,
}

impl Default for PlantState {
    fn default() -> Self {
        Self {
            polarity: Polarity::Normal,
            command: Command::Coast,
            duty: 0,
            speed_pps: 0.0,
            position: 0.0,
            last_pulse: 0,
            int_level: false,
            now_us: 0,
            pulses: 0,
        }
    }
}

/// Shared handle to the simulated mechanics.
#[derive(Debug, Clone)]
pub struct Plant {
    state: Arc<Mutex<PlantState>>,
    params: PlantParams,
}

impl Plant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState::default())),
            params,
        }
    }

    /// Split into the driver and encoder halves.
    pub fn split(&self) -> (SimulatedMotor, SimulatedEncoder) {
        (
            SimulatedMotor {
                plant: self.clone(),
            },
            SimulatedEncoder {
                plant: self.clone(),
            },
        )
    }

    /// Mechanical position in whole pulses.
    pub fn position(&self) -> i64 {
        self.state.lock().map(|s| s.last_pulse).unwrap_or(0)
    }

    /// Current shaft speed in pulses per second.
    pub fn speed_pps(&self) -> f64 {
        self.state.lock().map(|s| s.speed_pps).unwrap_or(0.0)
    }

    /// Last command/duty written by the driver side.
    pub fn output(&self) -> (Polarity, Command, u8) {
        self.state
            .lock()
            .map(|s| (s.polarity, s.command, s.duty))
            .unwrap_or((Polarity::Normal, Command::Coast, 0))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PlantState) -> T) -> Result<T, BoxError> {
        let mut guard = self.state.lock().map_err(|_| HwError::PlantPoisoned)?;
        Ok(f(&mut guard))
    }
}

/// Driver half of the simulated motor.
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    plant: Plant,
}

impl MotorDriver for SimulatedMotor {
    fn set_direction(&mut self, polarity: Polarity) -> Result<(), BoxError> {
        self.plant.with_state(|s| s.polarity = polarity)
    }

    fn set_command(&mut self, command: Command) -> Result<(), BoxError> {
        self.plant.with_state(|s| s.command = command)
    }

    fn set_duty_cycle(&mut self, duty: u8) -> Result<(), BoxError> {
        if duty > 100 {
            return Err(Box::new(HwError::InvalidDuty(duty)));
        }
        self.plant.with_state(|s| s.duty = duty)
    }
}

/// Encoder half of the simulated motor.
#[derive(Debug, Clone)]
pub struct SimulatedEncoder {
    plant: Plant,
}

impl SimulatedEncoder {
    /// Advance the plant to `now_us`, emitting one edge per pulse crossed.
    /// Returns the number of edges delivered (glitch edges included).
    pub fn advance_to(&self, now_us: u64, sink: &dyn EdgeSink) -> usize {
        let params = self.plant.params;
        let Ok(mut s) = self.plant.state.lock() else {
            tracing::warn!("simulated plant poisoned; no edges emitted");
            return 0;
        };
        let mut edges = 0usize;
        while s.now_us < now_us {
            let dt = SUBSTEP_US.min(now_us - s.now_us);
            let dt_s = dt as f64 / 1_000_000.0;
            let sign = if s.polarity.is_inversed() { -1.0 } else { 1.0 };
            let (target, tau_ms) = match s.command {
                Command::Run => (
                    sign * f64::from(s.duty) / 100.0 * params.free_pps,
                    params.run_tau_ms,
                ),
                Command::Coast => (0.0, params.coast_tau_ms),
                Command::Brake => (0.0, params.brake_tau_ms),
            };
            let alpha = (dt_s * 1000.0 / tau_ms.max(1.0)).min(1.0);
            s.speed_pps += (target - s.speed_pps) * alpha;

            let t0 = s.now_us;
            let prev = s.position;
            s.position += s.speed_pps * dt_s;
            s.now_us += dt;

            let span = s.position - prev;
            loop {
                let floor = s.position.floor() as i64;
                let forward = if floor > s.last_pulse {
                    true
                } else if floor < s.last_pulse {
                    false
                } else {
                    break;
                };
                let crossing = if forward {
                    (s.last_pulse + 1) as f64
                } else {
                    s.last_pulse as f64
                };
                let frac = if span.abs() > f64::EPSILON {
                    ((crossing - prev) / span).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let ts = t0 + (frac * dt as f64) as u64;
                s.last_pulse += if forward { 1 } else { -1 };
                s.int_level = !s.int_level;
                let dir_level = if forward { s.int_level } else { !s.int_level };
                sink.on_edge(s.int_level, dir_level, ts);
                edges += 1;
                s.pulses += 1;

                let slow = s.speed_pps.abs() < params.free_pps * GLITCH_MAX_SPEED_RATIO;
                if params.glitch_every > 0
                    && slow
                    && s.pulses % u64::from(params.glitch_every) == 0
                {
                    // int line chatters twice; dir line holds
                    sink.on_edge(!s.int_level, dir_level, ts + GLITCH_SPACING_US);
                    sink.on_edge(s.int_level, dir_level, ts + 2 * GLITCH_SPACING_US);
                    edges += 2;
                }
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Default)]
    struct CountingSink {
        net: AtomicI64,
        total: AtomicI64,
    }

    impl EdgeSink for CountingSink {
        fn on_edge(&self, int_level: bool, dir_level: bool, _ts: u64) {
            let delta = if int_level == dir_level { 1 } else { -1 };
            self.net.fetch_add(delta, Ordering::Relaxed);
            self.total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn coasting_plant_emits_nothing() {
        let plant = Plant::new(PlantParams::default());
        let (_motor, encoder) = plant.split();
        let sink = CountingSink::default();
        assert_eq!(encoder.advance_to(500_000, &sink), 0);
        assert_eq!(plant.position(), 0);
    }

    #[test]
    fn forward_run_counts_up_and_reverse_counts_down() {
        let plant = Plant::new(PlantParams::default());
        let (mut motor, encoder) = plant.split();
        let sink = CountingSink::default();

        motor.set_direction(Polarity::Normal).unwrap();
        motor.set_command(Command::Run).unwrap();
        motor.set_duty_cycle(50).unwrap();
        encoder.advance_to(1_000_000, &sink);
        let fwd = plant.position();
        assert!(fwd > 300, "moved {fwd}");
        assert_eq!(sink.net.load(Ordering::Relaxed), fwd);

        motor.set_direction(Polarity::Inversed).unwrap();
        encoder.advance_to(3_000_000, &sink);
        assert!(plant.position() < fwd);
        assert_eq!(sink.net.load(Ordering::Relaxed), plant.position());
    }

    #[test]
    fn rejects_duty_above_100() {
        let plant = Plant::new(PlantParams::default());
        let (mut motor, _) = plant.split();
        let err = motor.set_duty_cycle(101).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn glitches_add_two_edges_each() {
        let params = PlantParams {
            glitch_every: 1,
            ..PlantParams::default()
        };
        let plant = Plant::new(params);
        let (mut motor, encoder) = plant.split();
        let sink = CountingSink::default();
        motor.set_command(Command::Run).unwrap();
        motor.set_duty_cycle(20).unwrap();
        let edges = encoder.advance_to(500_000, &sink);
        let pulses = plant.position();
        assert!(pulses > 0);
        assert_eq!(edges as i64, pulses * 3);
    }
}
