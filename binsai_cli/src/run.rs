//! Commands that drive the peripherals: the supervisor loop, the R0 routine and
//! the self-check.

use crate::cli::SimArgs;
use crate::rig::{Rig, assemble};
use crate::rt::setup_rt_once;
use binsai_config::store::{ConfigStore, KEY_R0};
use binsai_config::Config;
use binsai_core::calibration::{PpmConverter, R0Params, calibrate_r0};
use binsai_core::supervisor::CheckItem;
use binsai_core::{Supervisor, Ticker};
use binsai_hardware::kv::FileKvStore;
use eyre::WrapErr;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Effective configuration plus the store it was overlaid from.
pub struct Session {
    pub cfg: Config,
    pub store: ConfigStore<FileKvStore>,
    pub json: bool,
}

impl Session {
    fn persist_device_id(&mut self, rig: &Rig) -> eyre::Result<()> {
        let mac = rig.hw.wifi.mac_address();
        if self.store.ensure_device_id(&mut self.cfg, mac)? {
            tracing::info!(device_id = %self.cfg.device.device_id, "first boot: device id stored");
        }
        Ok(())
    }
}

pub fn run(
    s: &mut Session,
    ticks: Option<u64>,
    sim: &SimArgs,
    rt: bool,
    rt_prio: Option<i32>,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let rig = assemble(&s.cfg, sim)?;
    s.persist_device_id(&rig)?;
    setup_rt_once(rt, rt_prio);

    let Rig { hw, clock, sim: handles } = rig;
    let mut sup = Supervisor::builder()
        .config(s.cfg.clone())
        .peripherals(hw)
        .clock(clock)
        .try_build()?;
    let report = sup.bring_up().wrap_err("bring-up")?;
    if let Err(e) = &report.modem {
        tracing::warn!(error = %e, "continuing without SMS");
    }
    if let Some(r0) = report.r0 {
        s.cfg.gas.mq135_r0 = r0.r0_kohm;
        s.store.save_key(&s.cfg, KEY_R0)?;
        tracing::info!(r0 = r0.r0_kohm, "boot R0 stored");
    }

    match ticks {
        Some(n) => {
            for _ in 0..n {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sup.run_ticks(1);
            }
            sup.shutdown();
        }
        None => sup.run(shutdown),
    }

    if let Some(h) = handles {
        for (i, sms) in h.modem.sent().iter().enumerate() {
            tracing::debug!(n = i + 1, number = %sms.number, body = %sms.body, "simulated SMS");
        }
    }
    print_summary(&sup, s.json);
    Ok(())
}

fn print_summary(sup: &Supervisor, json_mode: bool) {
    let ctx = sup.ctx();
    let cls = &ctx.classification;
    let c = &ctx.health.counters;
    if json_mode {
        let v = json!({
            "kind": "summary",
            "device_id": ctx.cfg.device.device_id,
            "t_ms": sup.now_ms(),
            "ticks": c.ticks,
            "fill_percent": cls.fill_percent,
            "ppm": cls.ppm,
            "capacity": cls.capacity.label(),
            "class": cls.waste_class.label(),
            "priority": cls.priority,
            "alerts_fired": c.alerts_fired,
            "alerts_suppressed": c.alerts_suppressed,
            "alerts_cloud_only": c.alerts_cloud_only,
            "sms_sent": c.sms_sent,
            "sms_failed": c.sms_failed,
            "publishes": c.publishes,
            "gsm_ok": ctx.health.gsm_ok,
            "cloud_ok": ctx.health.cloud_ok,
            "last_error": ctx.health.last_error_kind(),
        });
        println!("{v}");
    } else {
        println!(
            "{}: {} ticks over {} ms",
            ctx.cfg.device.device_id,
            c.ticks,
            sup.now_ms()
        );
        println!(
            "fill {:.1}% ({}), gas {:.0} ppm ({}), priority {}",
            cls.fill_percent,
            cls.capacity.label(),
            cls.ppm,
            cls.waste_class.label(),
            cls.priority
        );
        println!(
            "alerts fired {} (suppressed {}, cloud-only {}); sms sent {}, failed {}",
            c.alerts_fired, c.alerts_suppressed, c.alerts_cloud_only, c.sms_sent, c.sms_failed
        );
    }
}

pub fn calibrate(s: &mut Session, sim: &SimArgs) -> eyre::Result<()> {
    let Rig { mut hw, clock, .. } = assemble(&s.cfg, sim)?;
    let ticker = Ticker::new(clock);
    let conv = PpmConverter::from_config(&s.cfg.gas, hw.gas_adc.full_scale());
    let mut last_decile = 0;
    let out = calibrate_r0(
        hw.gas_adc.as_mut(),
        &conv,
        &ticker,
        R0Params::default(),
        &mut |pct| {
            if pct / 10 != last_decile {
                last_decile = pct / 10;
                tracing::info!(pct, "calibrating");
            }
        },
    )?;
    let previous = s.cfg.gas.mq135_r0;
    s.cfg.gas.mq135_r0 = out.r0_kohm;
    s.cfg.validate().wrap_err("invalid configuration")?;
    s.store.save_key(&s.cfg, KEY_R0)?;
    if s.json {
        println!(
            "{}",
            json!({
                "r0_kohm": out.r0_kohm,
                "previous_r0_kohm": previous,
                "mean_rs_kohm": out.mean_rs_kohm,
                "stdev_pct": out.stdev_pct,
                "samples": out.samples,
            })
        );
    } else {
        println!(
            "R0 = {:.2} kOhm (was {:.2}; spread {:.1}% over {} samples); saved",
            out.r0_kohm, previous, out.stdev_pct, out.samples
        );
    }
    Ok(())
}

/// Probes whose failure makes the self-check fail; the rest are advisory.
const REQUIRED: [&str; 2] = ["ultrasonic", "gas"];

pub fn self_check(s: &mut Session, sim: &SimArgs) -> eyre::Result<()> {
    let Rig { hw, clock, .. } = assemble(&s.cfg, sim)?;
    let mut sup = Supervisor::builder()
        .config(s.cfg.clone())
        .peripherals(hw)
        .clock(clock)
        .try_build()?;
    let items = sup.self_check();
    for CheckItem { name, outcome } in &items {
        if s.json {
            let v = match outcome {
                Ok(detail) => json!({ "probe": name, "ok": true, "detail": detail }),
                Err(e) => json!({ "probe": name, "ok": false, "error": e.kind(), "detail": e.to_string() }),
            };
            println!("{v}");
        } else {
            match outcome {
                Ok(detail) => println!("ok    {name:<10} {detail}"),
                Err(e) => println!("FAIL  {name:<10} {e}"),
            }
        }
    }
    sup.shutdown();
    let failed: Vec<&str> = items
        .iter()
        .filter(|i| i.outcome.is_err() && REQUIRED.contains(&i.name))
        .map(|i| i.name)
        .collect();
    if !failed.is_empty() {
        eyre::bail!("self-check failed: {}", failed.join(", "));
    }
    Ok(())
}
