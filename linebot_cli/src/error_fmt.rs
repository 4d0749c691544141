//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use linebot_core::error::{BuildError, DriveError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DriveError>() {
        return match de {
            DriveError::HardwareFault(msg) => format!(
                "What happened: A hardware backend fault ({msg}).\nLikely causes: Wrong pin numbers, wiring or power issues, or missing GPIO permissions.\nHow to fix: Check the [pins] section against the wiring and run with GPIO access."
            ),
            DriveError::Hardware(msg) => format!(
                "What happened: A hardware call failed ({msg}).\nLikely causes: Sensor bank, H-bridge, or PWM backend rejected the operation.\nHow to fix: Re-run with --log-level=debug to see which device failed."
            ),
            DriveError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            DriveError::State(msg) if msg.contains("max run time") => format!(
                "What happened: {msg}.\nLikely causes: The chassis lost the line, a pivot kept timing out, or the ceiling is too low for the course.\nHow to fix: Raise --max-run-ms, or check sensor polarity and turn thresholds."
            ),
            DriveError::State(msg) => format!(
                "What happened: Invalid state ({msg}).\nLikely causes: A command was issued in a mode that does not support it.\nHow to fix: Re-run with --log-level=debug for the mode transitions."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        let detail = err
            .source()
            .map(|src| format!(" ({src})"))
            .unwrap_or_default();
        return format!(
            "What happened: {msg}{detail}.\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun; an empty file selects the built-in defaults."
        );
    }

    if lower.contains("failed to read config") || lower.contains("failed to parse config") {
        return format!(
            "What happened: {msg}.\nLikely causes: The file is missing, unreadable, or not valid TOML.\nHow to fix: Point --config at a valid file; an empty file selects the built-in defaults."
        );
    }

    if lower.contains("gpio") || lower.contains("pwm channel") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
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

/// Map error classes to stable exit codes; anything unrecognized returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use linebot_core::error::{BuildError, DriveError};
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(de) = err.downcast_ref::<DriveError>() {
        return match de {
            DriveError::Config(_) => 2,
            DriveError::State(_) => 3,
            DriveError::Hardware(_) => 4,
            DriveError::HardwareFault(_) => 5,
        };
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("config") {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let kind = {
        use linebot_core::error::DriveError;
        match err.downcast_ref::<DriveError>() {
            Some(DriveError::Hardware(_)) => "hardware",
            Some(DriveError::HardwareFault(_)) => "hardware_fault",
            Some(DriveError::Config(_)) => "config",
            Some(DriveError::State(_)) => "state",
            None => "error",
        }
    };

    let obj = json!({
        "ok": false,
        "kind": kind,
        "error": err.to_string(),
        "hint": humanize(err),
    });
    obj.to_string()
}
