//! Hardware backend: H-bridge output and GPIO encoder input.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use eyre::WrapErr;
use tacho_config::{Config, Pins};
use tacho_core::error::Result as CoreResult;
use tacho_core::{TachoParts, build_tacho};
use tacho_hardware::hardware::{EncoderInput, HBridgeMotor};
use tacho_traits::EdgeSink;

use crate::cli::RunArgs;
use crate::run::{RunSummary, Supervisor, TraceWriter, configure, supervise_realtime};

/// Run one move on real hardware. Always paced by the wall clock.
pub fn run_hardware(
    cfg: &Config,
    pins: &Pins,
    parts: TachoParts,
    args: &RunArgs,
    max_ms: u64,
    shutdown: &AtomicBool,
) -> CoreResult<RunSummary> {
    let motor = HBridgeMotor::try_new(pins.bridge_in1, pins.bridge_in2, pins.pwm_hz)
        .wrap_err("open motor pins")?;
    let mut core = build_tacho(motor, parts, None).wrap_err("failed to build controller")?;
    configure(&mut core, args);

    let sink: Arc<dyn EdgeSink + Send + Sync> = core.decoder();
    // edges flow for as long as this lives
    let _input = EncoderInput::attach(
        pins.encoder_int,
        pins.encoder_dir,
        sink,
        core.timebase().clone(),
    )
    .wrap_err("open encoder pins")?;
    tracing::info!(
        int = pins.encoder_int,
        dir = pins.encoder_dir,
        in1 = pins.bridge_in1,
        in2 = pins.bridge_in2,
        "hardware backend"
    );

    let mut sup = Supervisor::new(cfg, args, max_ms, shutdown);
    let trace = args
        .trace
        .as_deref()
        .map(TraceWriter::create)
        .transpose()?;
    supervise_realtime(core, &mut sup, trace, args.stats, || {})
}
