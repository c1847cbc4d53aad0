//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

use tacho_core::{RunMode, StopMode};

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Move limit in effect for the current run (for JSON error details).
pub static LAST_MAX_MS: OnceLock<u64> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "tacho", version, about = "Closed-loop tacho motor controller")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Current
        } else {
            Self::None
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliRunMode {
    /// Run until --duration-ms elapses, then ramp down
    Forever,
    /// Timed move of --time-ms including both ramps
    Time,
    /// Move to --position (or by it, with --relative)
    Position,
}

impl From<CliRunMode> for RunMode {
    fn from(m: CliRunMode) -> Self {
        match m {
            CliRunMode::Forever => Self::Forever,
            CliRunMode::Time => Self::Time,
            CliRunMode::Position => Self::Position,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliStopMode {
    Coast,
    Brake,
    Hold,
}

impl From<CliStopMode> for StopMode {
    fn from(m: CliStopMode) -> Self {
        match m {
            CliStopMode::Coast => Self::Coast,
            CliStopMode::Brake => Self::Brake,
            CliStopMode::Hold => Self::Hold,
        }
    }
}

/// Options of the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Move type
    #[arg(long, value_enum, default_value = "forever")]
    pub mode: CliRunMode,
    /// Open-loop power in percent (-100..=100)
    #[arg(long, value_name = "PCT", default_value_t = 50, allow_hyphen_values = true)]
    pub duty: i32,
    /// Regulated speed in pulses per second (with --regulated)
    #[arg(long, value_name = "PPS", default_value_t = 400, allow_hyphen_values = true)]
    pub speed: i32,
    /// Duration of a timed move (ms)
    #[arg(long = "time-ms", value_name = "MS", default_value_t = 1_000)]
    pub time_ms: i32,
    /// Position target in pulses
    #[arg(long, value_name = "PULSES", default_value_t = 0, allow_hyphen_values = true)]
    pub position: i32,
    /// Treat --position as an offset from the previous target
    #[arg(long, action = ArgAction::SetTrue)]
    pub relative: bool,
    /// Full-scale ramp-up time (ms)
    #[arg(long = "ramp-up-ms", value_name = "MS", default_value_t = 0)]
    pub ramp_up_ms: i32,
    /// Full-scale ramp-down time (ms)
    #[arg(long = "ramp-down-ms", value_name = "MS", default_value_t = 0)]
    pub ramp_down_ms: i32,
    /// Close the speed loop instead of driving open-loop power
    #[arg(long, action = ArgAction::SetTrue)]
    pub regulated: bool,
    /// What the output does once stopped
    #[arg(long = "stop-mode", value_enum, default_value = "coast")]
    pub stop_mode: CliStopMode,
    /// How long a forever run lasts before the stop request (ms)
    #[arg(long = "duration-ms", value_name = "MS", default_value_t = 2_000)]
    pub duration_ms: u64,
    /// Override runner.max_ms: give up on a move that has not finished
    #[arg(long = "max-ms", value_name = "MS")]
    pub max_ms: Option<u64>,
    /// Write one CSV row per tick to FILE
    #[arg(long, value_name = "FILE")]
    pub trace: Option<PathBuf>,
    /// Tick on the wall clock in a background thread instead of simulated time
    #[arg(long, action = ArgAction::SetTrue)]
    pub realtime: bool,
    /// Print control loop timing stats
    #[arg(long, action = ArgAction::SetTrue)]
    pub stats: bool,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, pins to one CPU, and locks the process address space into RAM. Needs CAP_SYS_NICE/CAP_IPC_LOCK or root; failures are logged and the run continues.\n\nmacOS: Only mlockall is applied."
    )]
    pub rt: bool,
    /// Real-time priority for SCHED_FIFO on Linux (clamped to the system range)
    #[arg(long = "rt-prio", value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory locking mode for --rt: none, current, or all
    #[arg(long = "rt-lock", value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin to with --rt (Linux only, default 0)
    #[arg(long = "rt-cpu", value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one move against the simulated plant (or hardware, when built with it)
    Run(RunArgs),
    /// Short forward move on the simulator; fails if the encoder did not count
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
