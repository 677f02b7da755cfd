mod admin;
mod cli;
mod cloud;
mod error_fmt;
mod rig;
mod rt;
mod run;

use crate::cli::{Cli, Commands, ConfigAction, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::Session;
use binsai_config::{Config, ConfigStore, Logging};
use binsai_hardware::kv::FileKvStore;
use clap::Parser;
use eyre::WrapErr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        tracing::debug!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let base = read_config(&cli.config)?;
    init_tracing(&cli, &base.logging)?;

    let kv = FileKvStore::open_path(&cli.store)
        .wrap_err_with(|| format!("config store {}", cli.store.display()))?;
    let mut store = ConfigStore::new(kv);
    let cfg = store.load(&base)?;
    cfg.validate().wrap_err("invalid configuration")?;
    let mut session = Session {
        cfg,
        store,
        json: cli.json,
    };

    match cli.cmd {
        Commands::Run {
            ticks,
            sim,
            rt,
            rt_prio,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                tracing::warn!(error = %e, "Ctrl-C handler not installed");
            }
            run::run(&mut session, ticks, &sim, rt, rt_prio, &shutdown)
        }
        Commands::Calibrate { sim } => run::calibrate(&mut session, &sim),
        Commands::FitPpm { csv } => admin::fit_ppm(&mut session, &csv),
        Commands::Config { action } => match action {
            ConfigAction::Show => admin::config_show(&session),
            ConfigAction::Set { key, value } => admin::config_set(&mut session, &key, &value),
        },
        Commands::SelfCheck { sim } => run::self_check(&mut session, &sim),
    }
}

/// Read the provisioning TOML; a missing file means factory defaults.
fn read_config(path: &Path) -> eyre::Result<Config> {
    if !path.exists() {
        eprintln!(
            "warning: {} not found; using built-in defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    binsai_config::load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))
}

fn init_tracing(cli: &Cli, logging: &Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err_with(|| format!("invalid --log-level '{}'", cli.log_level))?;
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                "never" => tracing_appender::rolling::never(dir, name),
                other => eyre::bail!("logging.rotation must be never|daily|hourly, got '{other}'"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = logging.level.as_deref().unwrap_or("info");
            let filter = EnvFilter::try_new(level)
                .wrap_err_with(|| format!("invalid logging.level '{level}'"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")
}
