//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_MAX_MS;

/// Stable name of a run-ending error, used as `abort_reason` in JSON output.
pub fn abort_reason_name(err: &eyre::Report) -> &'static str {
    use tacho_core::error::TachoError;
    match err.downcast_ref::<TachoError>() {
        Some(TachoError::Estop) => "Estop",
        Some(TachoError::MoveTimeout(_)) => "MoveTimeout",
        Some(TachoError::Hardware(_) | TachoError::HardwareFault(_)) => "Hardware",
        Some(TachoError::Config(_)) => "Config",
        Some(TachoError::State(_)) => "State",
        None => "Error",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use tacho_core::error::{BuildError, TachoError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingDriver => {
                "What happened: No motor driver was provided to the controller.\nLikely causes: The output stage failed to initialize or was not wired into the builder.\nHow to fix: Ensure the driver is created successfully and passed via with_driver(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<TachoError>() {
        return match te {
            TachoError::Estop => "What happened: Emergency stop was triggered.\nLikely causes: Ctrl-C during a run, or an external stop request.\nHow to fix: Check the mechanism is clear, then start a new run.".to_string(),
            TachoError::MoveTimeout(ms) => format!(
                "What happened: The move did not finish within {ms} ms.\nLikely causes: Stalled or overloaded motor, an unreachable target, or a limit set too low.\nHow to fix: Check the mechanics and encoder wiring; raise runner.max_ms or pass --max-ms."
            ),
            TachoError::Hardware(msg) | TachoError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wrong pins, missing power, or no GPIO permissions.\nHow to fix: Verify [pins] in the config and the wiring, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open motor pins") || lower.contains("open encoder pins") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("must be") {
        let detail = err
            .chain()
            .map(ToString::to_string)
            .find(|m| m.contains("must be"))
            .unwrap_or_else(|| msg.clone());
        return format!(
            "What happened: Configuration is invalid ({detail}).\nLikely causes: Out-of-range values or a typo in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("failed to read config") || lower.contains("failed to parse config") {
        let mut cause = String::new();
        if let Some(src) = err.source() {
            cause = format!(" Cause: {src}");
        }
        return format!(
            "What happened: {msg}.{cause}\nHow to fix: Check the --config path and the TOML syntax."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 estop, 3 move timeout, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use tacho_core::error::TachoError;
    match err.downcast_ref::<TachoError>() {
        Some(TachoError::Estop) => 2,
        Some(TachoError::MoveTimeout(_)) => 3,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use tacho_core::error::TachoError;

    let reason = abort_reason_name(err);
    let msg = humanize(err);
    if let Some(TachoError::MoveTimeout(_)) = err.downcast_ref::<TachoError>()
        && let Some(max_ms) = LAST_MAX_MS.get()
    {
        return json!({ "reason": reason, "details": { "max_ms": max_ms }, "message": msg })
            .to_string();
    }
    json!({ "reason": reason, "message": msg }).to_string()
}
