//! Move execution: config mapping, plant assembly, and the control loop.
//!
//! By default the plant and the controller advance together on a simulated
//! clock, so a run is deterministic and finishes as fast as the CPU allows.
//! `--realtime` hands ticking to a [`Ticker`] thread paced by the wall clock.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use tacho_core::error::{Result as CoreResult, TachoError};
use tacho_core::util::{tick_period_us, ticks_for_ms};
use tacho_core::{
    MotorModel, PositionMode, RegulationMode, TachoCore, TachoParts, TickReport, Ticker,
    build_tacho,
};
use tacho_hardware::{Plant, PlantParams, SimulatedEncoder, SimulatedMotor};
use tacho_traits::MotorDriver;
use tacho_traits::clock::MonotonicClock;

use crate::cli::{LAST_MAX_MS, RtLock, RunArgs};
use crate::rt::setup_rt_once;

/// Env hook for tests: arm the estop after this many ms of run time.
const ESTOP_AFTER_ENV: &str = "TACHO_TEST_ESTOP_AFTER_MS";
/// Poll period of the realtime supervisor loop.
const REALTIME_POLL: Duration = Duration::from_millis(1);
/// Simulated run time of the self-check move.
const SELF_CHECK_MS: u64 = 500;

/// Outcome of a finished move.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub report: TickReport,
    /// Mechanical position of the plant, when simulated.
    pub plant_position: Option<i64>,
    pub elapsed_ms: u64,
    pub ticks: u64,
}

/// Plant parameters from `[sim]`, scaled to the configured motor model.
pub fn plant_params(sim: &tacho_config::SimCfg, model: MotorModel) -> PlantParams {
    let max = f64::from(model.max_pulses_per_second());
    PlantParams {
        free_pps: max * f64::from(sim.free_speed_percent) / 100.0,
        run_tau_ms: f64::from(sim.time_constant_ms),
        coast_tau_ms: f64::from(sim.coast_time_constant_ms),
        brake_tau_ms: f64::from(sim.brake_time_constant_ms),
        glitch_every: sim.glitch_every,
    }
}

/// Apply the move setpoints and modes from the command line.
pub fn configure<D: MotorDriver>(t: &mut TachoCore<D>, args: &RunArgs) {
    t.set_run_mode(args.mode.into());
    t.set_stop_mode(args.stop_mode.into());
    t.set_regulation_mode(if args.regulated {
        RegulationMode::On
    } else {
        RegulationMode::Off
    });
    t.set_position_mode(if args.relative {
        PositionMode::Relative
    } else {
        PositionMode::Absolute
    });
    t.set_duty_cycle_sp(args.duty);
    t.set_speed_sp(args.speed);
    t.set_time_sp(args.time_ms);
    t.set_position_sp(args.position);
    t.set_ramp_up_sp(args.ramp_up_ms);
    t.set_ramp_down_sp(args.ramp_down_ms);
}

fn estop_after_ms() -> Option<u64> {
    std::env::var(ESTOP_AFTER_ENV).ok()?.parse().ok()
}

/// Per-tick CSV trace.
pub(crate) struct TraceWriter {
    w: csv::Writer<std::fs::File>,
}

impl TraceWriter {
    pub(crate) fn create(path: &Path) -> eyre::Result<Self> {
        let mut w = csv::Writer::from_path(path)
            .wrap_err_with(|| format!("failed to create trace file {}", path.display()))?;
        w.write_record(["t_ms", "state", "position", "speed", "power", "percent"])?;
        Ok(Self { w })
    }

    fn record(&mut self, t_ms: u64, r: &TickReport) -> eyre::Result<()> {
        self.w.write_record([
            t_ms.to_string(),
            r.state.to_string(),
            r.position.to_string(),
            r.speed.to_string(),
            r.power.to_string(),
            r.percent.to_string(),
        ])?;
        Ok(())
    }

    fn finish(mut self) -> eyre::Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

/// Run limits and interrupt handling checked between ticks.
pub(crate) struct Supervisor<'a> {
    args: &'a RunArgs,
    max_ms: u64,
    estop_after: Option<u64>,
    estop_on_interrupt: bool,
    shutdown: &'a AtomicBool,
    interrupted: bool,
    stop_requested: bool,
}

impl<'a> Supervisor<'a> {
    pub(crate) fn new(
        cfg: &tacho_config::Config,
        args: &'a RunArgs,
        max_ms: u64,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            args,
            max_ms,
            estop_after: estop_after_ms(),
            estop_on_interrupt: cfg.estop.on_interrupt,
            shutdown,
            interrupted: false,
            stop_requested: false,
        }
    }

    /// Inspect the run at `elapsed_ms`; may arm the estop or request a stop.
    fn check<D: MotorDriver>(&mut self, t: &mut TachoCore<D>, elapsed_ms: u64) -> CoreResult<()> {
        let fire_test_estop = self.estop_after.is_some_and(|ms| elapsed_ms >= ms);
        if (self.shutdown.load(Ordering::Relaxed) && !self.interrupted) || fire_test_estop {
            self.interrupted = true;
            self.estop_after = None;
            if self.estop_on_interrupt || fire_test_estop {
                tracing::warn!(elapsed_ms, "interrupt: arming estop");
                t.set_estop(0);
                return Err(TachoError::Estop.into());
            }
            tracing::info!(elapsed_ms, "interrupt: ramping down");
            t.set_run(false);
        }
        if !self.stop_requested
            && self.args.mode == crate::cli::CliRunMode::Forever
            && elapsed_ms >= self.args.duration_ms
        {
            self.stop_requested = true;
            tracing::debug!(elapsed_ms, "duration reached; stopping");
            t.set_run(false);
        }
        if elapsed_ms > self.max_ms && t.is_running() {
            tracing::error!(elapsed_ms, max_ms = self.max_ms, "move timed out");
            t.set_estop(0);
            return Err(TachoError::MoveTimeout(self.max_ms).into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct LoopStats {
    count: u64,
    min: u64,
    max: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean (Welford).
    m2: f64,
    missed: u64,
}

impl LoopStats {
    fn record(&mut self, period_us: u64, t_start: Instant) {
        let latency = u64::try_from(t_start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.push(latency, period_us);
    }

    fn push(&mut self, latency: u64, period_us: u64) {
        self.min = if self.count == 0 { latency } else { self.min.min(latency) };
        self.max = self.max.max(latency);
        self.count += 1;
        let x = latency as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        if latency > period_us {
            self.missed = self.missed.saturating_add(1);
        }
    }

    fn stdev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        }
    }
}

#[allow(clippy::too_many_lines)]
pub fn run_move(
    cfg: &tacho_config::Config,
    args: &RunArgs,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<RunSummary> {
    // no-op unless --rt; applied once per process
    let lock = args.rt_lock.unwrap_or(RtLock::os_default());
    setup_rt_once(args.rt, args.rt_prio, lock, args.rt_cpu);

    let max_ms = args.max_ms.unwrap_or(cfg.runner.max_ms);
    let _ = LAST_MAX_MS.set(max_ms);

    let parts = TachoParts::from(cfg);
    let plant = Plant::new(plant_params(&cfg.sim, parts.model));
    let (motor, encoder) = plant.split();

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if let Some(pins) = &cfg.pins {
        return crate::hw::run_hardware(cfg, pins, parts, args, max_ms, &shutdown);
    }

    let mut core = build_tacho(motor, parts, None).wrap_err("failed to build controller")?;
    configure(&mut core, args);

    let mut sup = Supervisor::new(cfg, args, max_ms, &shutdown);
    let trace = args
        .trace
        .as_deref()
        .map(TraceWriter::create)
        .transpose()?;

    tracing::info!(
        mode = ?args.mode,
        regulated = args.regulated,
        realtime = args.realtime,
        "move start"
    );
    let summary = if args.realtime {
        run_realtime(core, &encoder, &mut sup, trace, args.stats)?
    } else {
        run_simulated(core, &encoder, &mut sup, trace, args.stats)?
    };
    tracing::info!(
        position = summary.report.position,
        plant_position = ?summary.plant_position,
        elapsed_ms = summary.elapsed_ms,
        "move complete"
    );
    Ok(RunSummary {
        plant_position: Some(plant.position()),
        ..summary
    })
}

fn run_simulated(
    mut core: TachoCore<SimulatedMotor>,
    encoder: &SimulatedEncoder,
    sup: &mut Supervisor<'_>,
    mut trace: Option<TraceWriter>,
    stats: bool,
) -> CoreResult<RunSummary> {
    let tick_ms = u64::from(core.tick_ms().max(1).unsigned_abs());
    let period_us = tick_period_us(core.tick_ms());
    let decoder = core.decoder();
    let mut loop_stats = LoopStats::default();

    core.set_run(true);
    let mut k = 0u64;
    let report = loop {
        k += 1;
        let now_us = k * period_us;
        let elapsed_ms = k * tick_ms;
        encoder.advance_to(now_us, &*decoder);

        let t_start = Instant::now();
        let report = core.tick_at(now_us);
        if stats {
            loop_stats.record(period_us, t_start);
        }
        if let Some(w) = trace.as_mut() {
            w.record(elapsed_ms, &report)?;
        }
        if !report.running {
            break report;
        }
        sup.check(&mut core, elapsed_ms)?;
    };
    if let Some(w) = trace {
        w.finish()?;
    }
    if stats {
        print_stats(&loop_stats, k, period_us, None);
    }
    Ok(RunSummary {
        report,
        plant_position: None,
        elapsed_ms: k * tick_ms,
        ticks: core.ticks(),
    })
}

fn run_realtime(
    core: TachoCore<SimulatedMotor>,
    encoder: &SimulatedEncoder,
    sup: &mut Supervisor<'_>,
    trace: Option<TraceWriter>,
    stats: bool,
) -> CoreResult<RunSummary> {
    let decoder = core.decoder();
    let timebase = core.timebase().clone();
    supervise_realtime(core, sup, trace, stats, move || {
        encoder.advance_to(timebase.now_us(), &*decoder);
    })
}

/// Wall-clock loop shared by the simulated and hardware backends. `feed` is
/// called every poll to deliver edges that have not arrived on their own.
pub(crate) fn supervise_realtime<D>(
    mut core: TachoCore<D>,
    sup: &mut Supervisor<'_>,
    mut trace: Option<TraceWriter>,
    stats: bool,
    mut feed: impl FnMut(),
) -> CoreResult<RunSummary>
where
    D: MotorDriver + Send + 'static,
{
    let period = Duration::from_micros(tick_period_us(core.tick_ms()));
    core.set_run(true);
    let started = Instant::now();
    let core = Arc::new(Mutex::new(core));
    let ticker = Ticker::spawn(core.clone(), period, MonotonicClock::new());

    let mut last = None;
    loop {
        feed();
        if let Some(r) = ticker.latest() {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if let Some(w) = trace.as_mut() {
                w.record(elapsed_ms, &r)?;
            }
            last = Some(r);
            if !r.running {
                break;
            }
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        {
            let mut t = core
                .lock()
                .map_err(|_| TachoError::State("controller mutex poisoned".into()))?;
            sup.check(&mut t, elapsed_ms)?;
        }
        std::thread::sleep(REALTIME_POLL);
    }
    let ticks = ticker.ticks();
    let overruns = ticker.overruns();
    drop(ticker);

    if let Some(w) = trace {
        w.finish()?;
    }
    if stats {
        let period_us = period.as_micros() as u64;
        print_stats(&LoopStats::default(), ticks, period_us, Some(overruns));
    }
    let t = core
        .lock()
        .map_err(|_| TachoError::State("controller mutex poisoned".into()))?;
    let report = last.unwrap_or(TickReport {
        state: t.state(),
        running: false,
        position: t.position(),
        speed: t.speed(),
        power: t.duty_cycle(),
        percent: t.ramp_percent(),
        speed_updated: false,
    });
    Ok(RunSummary {
        report,
        plant_position: None,
        elapsed_ms: started.elapsed().as_millis() as u64,
        ticks,
    })
}

/// Forward open-loop move on a fresh simulator; the encoder must count.
pub fn self_check(cfg: &tacho_config::Config) -> CoreResult<i32> {
    let parts = TachoParts::from(cfg);
    let plant = Plant::new(plant_params(&cfg.sim, parts.model));
    let (motor, encoder) = plant.split();
    let mut core = build_tacho(motor, parts, None).wrap_err("failed to build controller")?;
    let decoder = core.decoder();
    let period_us = tick_period_us(core.tick_ms());

    core.set_duty_cycle_sp(50);
    core.set_run(true);
    for k in 1..=ticks_for_ms(SELF_CHECK_MS, core.tick_ms()) {
        encoder.advance_to(k * period_us, &*decoder);
        core.tick_at(k * period_us);
    }
    core.set_run(false);

    let position = core.position();
    if position <= 0 || i64::from(position) != plant.position() {
        return Err(TachoError::Hardware(format!(
            "encoder count {position} does not match plant position {}",
            plant.position()
        ))
        .into());
    }
    Ok(position)
}

/// Print latency/overrun stats to stderr.
fn print_stats(stats: &LoopStats, ticks: u64, period_us: u64, overruns: Option<u64>) {
    eprintln!("\n--- Tacho Stats ---");
    eprintln!("Ticks: {ticks}");
    eprintln!("Period (us): {period_us}");
    if stats.count > 0 {
        eprintln!(
            "Tick cost min/avg/max/stdev (us): {} / {:.1} / {} / {:.1}",
            stats.min,
            stats.mean,
            stats.max,
            stats.stdev()
        );
        eprintln!("Ticks over period: {}", stats.missed);
    }
    if let Some(o) = overruns {
        eprintln!("Overruns: {o}");
    }
    eprintln!("-------------------\n");
}
