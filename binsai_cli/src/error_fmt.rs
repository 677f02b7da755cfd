//! Human-readable error descriptions and structured JSON error formatting.

use binsai_core::BinsaiError;

fn typed(err: &eyre::Report) -> Option<&BinsaiError> {
    err.chain().find_map(|e| e.downcast_ref::<BinsaiError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = typed(err) {
        return match be {
            BinsaiError::Fatal(what) => format!(
                "What happened: Fatal hardware fault ({what}).\nLikely causes: Gas-sensor ADC not powered, SPI disabled, or wrong ADC channel.\nHow to fix: Check the MCP3008 wiring and hardware.adc_channel, enable SPI, then restart."
            ),
            BinsaiError::CalibrationUnstable { stdev_pct } => format!(
                "What happened: R0 calibration rejected (spread {stdev_pct:.1}% of mean).\nLikely causes: Sensor not warmed up, or air around the sensor is not clean.\nHow to fix: Let the MQ-135 heat for several minutes in fresh air and rerun `binsai calibrate`. The previous R0 was kept."
            ),
            BinsaiError::SensorOutOfRange(what) => format!(
                "What happened: Sensor readings unusable ({what}).\nLikely causes: Gas-sensor output stuck at 0 V or disconnected.\nHow to fix: Check the sensor supply and load resistor, then rerun."
            ),
            BinsaiError::ModemNoResponse(what) => format!(
                "What happened: GSM modem not ready ({what}).\nLikely causes: Modem unpowered, missing SIM, or no network coverage.\nHow to fix: Check the SIM card, antenna and hardware.gsm_uart; alerts still reach the cloud."
            ),
            BinsaiError::Config(msg) | BinsaiError::ConfigMissing(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or the store.\nHow to fix: Fix the value with `binsai config set <key> <value>` or edit the TOML, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range values in the TOML or the store.\nHow to fix: Edit the config and try again. Detail: {msg}"
        );
    }
    if lower.contains("parse config") {
        return format!(
            "What happened: The config file is not valid TOML.\nHow to fix: Correct the syntax and try again. Detail: {msg}"
        );
    }
    if lower.contains("campaign csv must have headers") {
        return "Invalid headers in campaign CSV. Expected 'adc,ppm'.".to_string();
    }
    if lower.contains("open ultrasonic") || (lower.contains("pin") && lower.contains("open")) {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [hardware] values in the config; ensure the process has permission to access GPIO.".to_string();
    }
    if lower.contains("config store") {
        return format!(
            "What happened: The persisted settings could not be read or written.\nLikely causes: Unwritable --store directory or a corrupted store file.\nHow to fix: Check permissions, or remove the store to fall back to the TOML. Detail: {msg}"
        );
    }

    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for typed failures; everything else exits with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match typed(err) {
        Some(BinsaiError::Fatal(_)) => 3,
        Some(BinsaiError::CalibrationUnstable { .. }) => 4,
        Some(BinsaiError::SensorOutOfRange(_)) => 5,
        Some(BinsaiError::ModemNoResponse(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let reason = typed(err).map_or("Error", BinsaiError::kind);
    serde_json::json!({ "reason": reason, "message": humanize(err) }).to_string()
}
