//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "binsai", version, about = "Smart-bin monitor")]
pub struct Cli {
    /// Path to the provisioning TOML
    #[arg(long, value_name = "FILE", default_value = "etc/binsai_config.toml")]
    pub config: PathBuf,

    /// Persisted key/value store (overrides the TOML, written by calibrate/config set)
    #[arg(long, value_name = "FILE", default_value = "var/binsai_store.toml")]
    pub store: PathBuf,

    /// Emit JSON lines instead of human-readable text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Inputs of the simulated peripherals (ignored with `--features hardware`).
#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// Distance reported by the simulated ultrasonic sensor
    #[arg(long, value_name = "CM", default_value_t = 38.0)]
    pub distance_cm: f32,
    /// Gas level the simulated ADC is set to
    #[arg(long, value_name = "PPM", default_value_t = 120.0)]
    pub ppm: f32,
    /// Simulated GPS fix as `lat,lon`
    #[arg(long, value_name = "LAT,LON", value_parser = parse_fix)]
    pub gps_fix: Option<(f64, f64)>,
    /// Simulated modem never answers
    #[arg(long, action = ArgAction::SetTrue)]
    pub modem_down: bool,
    /// Simulated cloud rejects every connection
    #[arg(long, action = ArgAction::SetTrue)]
    pub offline: bool,
    /// Run without a display
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_display: bool,
    /// Use a virtual clock: waits advance time instantly
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim_time: bool,
}

fn parse_fix(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{s}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("fix out of range: {lat},{lon}"));
    }
    Ok((lat, lon))
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring up the peripherals and run the supervisor loop
    Run {
        /// Stop after this many loop iterations (default: until Ctrl-C)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        #[command(flatten)]
        sim: SimArgs,
        /// Enable real-time mode (SCHED_FIFO, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority and mlockall(MCL_CURRENT) so the ultrasonic echo timing is not disturbed by page faults or other processes. Requires CAP_SYS_NICE/CAP_IPC_LOCK or root; failures are logged and the loop continues."
        )]
        rt: bool,
        /// SCHED_FIFO priority when --rt is enabled (Linux only)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
    },
    /// Run the clean-air R0 routine and persist the result
    Calibrate {
        #[command(flatten)]
        sim: SimArgs,
    },
    /// Fit power-law coefficients from an `adc,ppm` campaign CSV and persist them
    FitPpm {
        /// Campaign CSV with header `adc,ppm`
        #[arg(value_name = "CSV")]
        csv: PathBuf,
    },
    /// Inspect or change the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Probe every peripheral once
    SelfCheck {
        #[command(flatten)]
        sim: SimArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (TOML with store overrides)
    Show,
    /// Set one persisted key
    Set {
        /// Key name, e.g. crit_cap or sms_cd
        key: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_pairs() {
        assert_eq!(parse_fix("-6.2, 106.8"), Ok((-6.2, 106.8)));
        assert!(parse_fix("91,0").is_err());
        assert!(parse_fix("1.0").is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
