mod cli;
mod error_fmt;
#[cfg(all(feature = "hardware", target_os = "linux"))]
mod hw;
mod rt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use serde_json::json;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RunArgs};
use crate::error_fmt::{abort_reason_name, exit_code_for_error, format_error_json, humanize};
use crate::run::RunSummary;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .install()?;

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    match cli.cmd {
        Commands::Health => {
            if cli.json {
                println!("{}", json!({ "status": "ok" }));
            } else {
                println!("ok");
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let position = run::self_check(&cfg)?;
            tracing::info!(position, "self-check passed");
            if cli.json {
                println!("{}", json!({ "status": "ok", "position": position }));
            } else {
                println!("self-check ok (moved {position} pulses)");
            }
            Ok(())
        }
        Commands::Run(args) => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "failed to install Ctrl-C handler");
            }
            let started = std::time::Instant::now();
            let result = run::run_move(&cfg, &args, shutdown);
            let duration_ms = started.elapsed().as_millis() as u64;
            if cli.json {
                println!("{}", summary_json(&args, result.as_ref(), duration_ms));
            }
            let summary = result?;
            if !cli.json {
                print_summary(&summary);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<tacho_config::Config> {
    let Some(path) = path else {
        return Ok(tacho_config::Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let cfg = tacho_config::load_toml(&text)
        .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &tacho_config::Logging) -> Result<()> {
    // RUST_LOG wins; then [logging].level; then --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.as_deref().unwrap_or(level)))
        .wrap_err("invalid log level")?;

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map_or_else(|| "tacho.log".into(), |n| n.to_string_lossy().into_owned());
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .wrap_err("failed to install tracing subscriber")
}

fn summary_json(args: &RunArgs, result: Result<&RunSummary, &eyre::Report>, duration_ms: u64) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    let target = matches!(args.mode, crate::cli::CliRunMode::Position).then_some(args.position);
    match result {
        Ok(s) => json!({
            "timestamp": timestamp,
            "mode": format!("{:?}", args.mode).to_ascii_lowercase(),
            "regulated": args.regulated,
            "target": target,
            "position": s.report.position,
            "plant_position": s.plant_position,
            "speed": s.report.speed,
            "state": s.report.state.as_str(),
            "ticks": s.ticks,
            "sim_ms": s.elapsed_ms,
            "duration_ms": duration_ms,
            "abort_reason": serde_json::Value::Null,
        }),
        Err(e) => json!({
            "timestamp": timestamp,
            "mode": format!("{:?}", args.mode).to_ascii_lowercase(),
            "regulated": args.regulated,
            "target": target,
            "position": serde_json::Value::Null,
            "plant_position": serde_json::Value::Null,
            "speed": serde_json::Value::Null,
            "state": serde_json::Value::Null,
            "ticks": serde_json::Value::Null,
            "sim_ms": serde_json::Value::Null,
            "duration_ms": duration_ms,
            "abort_reason": abort_reason_name(e),
        }),
    }
    .to_string()
}

fn print_summary(s: &RunSummary) {
    println!(
        "move complete: position {} pulses, speed {} pps, state {}, {} ms, {} ticks",
        s.report.position, s.report.speed, s.report.state, s.elapsed_ms, s.ticks
    );
    if let Some(p) = s.plant_position {
        println!("plant position: {p} pulses");
    }
}
