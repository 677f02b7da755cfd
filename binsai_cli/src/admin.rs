//! Offline administration: persisted config and the PPM curve fit.

use crate::run::Session;
use binsai_config::store::{KEY_PPM_A, KEY_PPM_B, KEY_PPM_MODEL, set_from_str};
use binsai_config::{PpmModel, load_campaign_csv, to_toml};
use eyre::WrapErr;
use serde_json::json;
use std::path::Path;

const MASK: &str = "********";

pub fn fit_ppm(s: &mut Session, csv: &Path) -> eyre::Result<()> {
    let fit = load_campaign_csv(csv)?;
    s.cfg.gas.model = PpmModel::Power;
    s.cfg.gas.coeff_a = Some(fit.a);
    s.cfg.gas.coeff_b = Some(fit.b);
    s.cfg.validate().wrap_err("invalid configuration")?;
    for key in [KEY_PPM_MODEL, KEY_PPM_A, KEY_PPM_B] {
        s.store.save_key(&s.cfg, key)?;
    }
    tracing::info!(a = fit.a, b = fit.b, "power-law coefficients stored");
    if s.json {
        println!("{}", json!({ "model": "power", "a": fit.a, "b": fit.b }));
    } else {
        println!("ppm = {:.6} * adc^{:.4}; saved", fit.a, fit.b);
    }
    Ok(())
}

pub fn config_show(s: &Session) -> eyre::Result<()> {
    let mut shown = s.cfg.clone();
    for secret in [&mut shown.network.wifi_pass, &mut shown.network.cloud_token] {
        if !secret.is_empty() {
            *secret = MASK.to_string();
        }
    }
    if s.json {
        println!("{}", serde_json::to_string(&shown)?);
    } else {
        print!("{}", to_toml(&shown)?);
    }
    Ok(())
}

pub fn config_set(s: &mut Session, key: &str, value: &str) -> eyre::Result<()> {
    set_from_str(&mut s.cfg, key, value)?;
    s.cfg.validate().wrap_err("invalid configuration")?;
    s.store.save_key(&s.cfg, key)?;
    if key == KEY_PPM_MODEL {
        // Stored coefficients belong to the previous model.
        s.store.save_key(&s.cfg, KEY_PPM_A)?;
        s.store.save_key(&s.cfg, KEY_PPM_B)?;
    }
    tracing::info!(key, "config key stored");
    if s.json {
        println!("{}", json!({ "key": key, "saved": true }));
    } else {
        println!("{key} saved");
    }
    Ok(())
}
