//! Persisted settings in the namespaced key/value area.
//!
//! The provisioning TOML gives the default table; every key present in the
//! store overrides the matching field. Absent keys are not an error.
use binsai_traits::{KvStore, KvValue};

use crate::{Config, PpmModel};

pub const NAMESPACE: &str = "binsai_cfg";

pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_R0: &str = "mq135_r0";
pub const KEY_US_OFFSET: &str = "us_offset";
pub const KEY_CRIT_CAP: &str = "crit_cap";
pub const KEY_CRIT_GAS: &str = "crit_gas";
pub const KEY_SMS_COOLDOWN: &str = "sms_cd";
pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASS: &str = "wifi_pass";
pub const KEY_PPM_MODEL: &str = "ppm_model";
pub const KEY_PPM_A: &str = "ppm_a";
pub const KEY_PPM_B: &str = "ppm_b";
pub const KEY_RESET_BELOW: &str = "reset_below";

/// Every key the store understands, in save order.
pub const KEYS: [&str; 12] = [
    KEY_DEVICE_ID,
    KEY_R0,
    KEY_US_OFFSET,
    KEY_CRIT_CAP,
    KEY_CRIT_GAS,
    KEY_SMS_COOLDOWN,
    KEY_WIFI_SSID,
    KEY_WIFI_PASS,
    KEY_PPM_MODEL,
    KEY_PPM_A,
    KEY_PPM_B,
    KEY_RESET_BELOW,
];

fn kv_err(op: &str, e: binsai_traits::BoxError) -> eyre::Report {
    eyre::eyre!("config store {op}: {e}")
}

/// Device id derived from the low three MAC bytes, e.g. `BINSAI-A1B2C3`.
pub fn device_id_from_mac(mac: [u8; 6]) -> String {
    format!("BINSAI-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5])
}

pub struct ConfigStore<K: KvStore> {
    kv: K,
}

impl<K: KvStore> ConfigStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn into_inner(self) -> K {
        self.kv
    }

    /// Overlay persisted values on `base` and return the result.
    pub fn load(&mut self, base: &Config) -> eyre::Result<Config> {
        self.kv.open(NAMESPACE).map_err(|e| kv_err("open", e))?;
        let mut cfg = base.clone();
        let res = KEYS.iter().try_for_each(|key| {
            match self.kv.get(key).map_err(|e| kv_err("get", e))? {
                Some(value) => {
                    if !apply_value(&mut cfg, key, value) {
                        tracing::warn!(key, "persisted value has unexpected type; using default");
                    }
                }
                None => tracing::debug!(key, "no persisted value; using default"),
            }
            Ok::<(), eyre::Report>(())
        });
        let closed = self.kv.close().map_err(|e| kv_err("close", e));
        res?;
        closed?;
        Ok(cfg)
    }

    /// Write every persisted field of `cfg`. Each key is written atomically.
    pub fn save(&mut self, cfg: &Config) -> eyre::Result<()> {
        self.kv.open(NAMESPACE).map_err(|e| kv_err("open", e))?;
        let res = KEYS.iter().try_for_each(|key| match field_value(cfg, key) {
            Some(v) => self.kv.set(key, v).map_err(|e| kv_err("set", e)),
            None => Ok(()),
        });
        let closed = self.kv.close().map_err(|e| kv_err("close", e));
        res?;
        closed?;
        tracing::info!(namespace = NAMESPACE, "configuration saved");
        Ok(())
    }

    /// Write a single field of `cfg` (used after calibration).
    pub fn save_key(&mut self, cfg: &Config, key: &str) -> eyre::Result<()> {
        let Some(v) = field_value(cfg, key) else {
            eyre::bail!("unknown or unset config key '{key}'");
        };
        self.kv.open(NAMESPACE).map_err(|e| kv_err("open", e))?;
        let res = self.kv.set(key, v).map_err(|e| kv_err("set", e));
        let closed = self.kv.close().map_err(|e| kv_err("close", e));
        res?;
        closed
    }

    /// Derive and persist the device id on first boot. Returns true when a new
    /// id was written.
    pub fn ensure_device_id(&mut self, cfg: &mut Config, mac: [u8; 6]) -> eyre::Result<bool> {
        if !cfg.device.device_id.is_empty() {
            return Ok(false);
        }
        cfg.device.device_id = device_id_from_mac(mac);
        self.save_key(cfg, KEY_DEVICE_ID)?;
        tracing::info!(device_id = %cfg.device.device_id, "device id derived from MAC");
        Ok(true)
    }
}

fn apply_value(cfg: &mut Config, key: &str, value: KvValue) -> bool {
    match (key, value) {
        (KEY_DEVICE_ID, KvValue::Str(s)) => cfg.device.device_id = s,
        (KEY_R0, KvValue::F32(v)) => cfg.gas.mq135_r0 = v,
        (KEY_US_OFFSET, KvValue::F32(v)) => cfg.device.us_offset_cm = v,
        (KEY_CRIT_CAP, KvValue::F32(v)) => cfg.thresholds.critical_fill = v,
        (KEY_CRIT_GAS, KvValue::F32(v)) => cfg.thresholds.critical_ppm = v,
        (KEY_SMS_COOLDOWN, KvValue::U64(v)) => cfg.sms.cooldown_ms = v,
        (KEY_SMS_COOLDOWN, KvValue::U32(v)) => cfg.sms.cooldown_ms = u64::from(v),
        (KEY_WIFI_SSID, KvValue::Str(s)) => cfg.network.wifi_ssid = s,
        (KEY_WIFI_PASS, KvValue::Str(s)) => cfg.network.wifi_pass = s,
        (KEY_PPM_MODEL, KvValue::Str(s)) => match s.parse::<PpmModel>() {
            Ok(m) => cfg.gas.model = m,
            Err(_) => return false,
        },
        (KEY_PPM_A, KvValue::F32(v)) => cfg.gas.coeff_a = Some(v),
        (KEY_PPM_B, KvValue::F32(v)) => cfg.gas.coeff_b = Some(v),
        (KEY_RESET_BELOW, KvValue::F32(v)) => cfg.thresholds.reset_below = v,
        _ => return false,
    }
    true
}

fn field_value(cfg: &Config, key: &str) -> Option<KvValue> {
    Some(match key {
        KEY_DEVICE_ID if !cfg.device.device_id.is_empty() => {
            KvValue::Str(cfg.device.device_id.clone())
        }
        KEY_R0 => KvValue::F32(cfg.gas.mq135_r0),
        KEY_US_OFFSET => KvValue::F32(cfg.device.us_offset_cm),
        KEY_CRIT_CAP => KvValue::F32(cfg.thresholds.critical_fill),
        KEY_CRIT_GAS => KvValue::F32(cfg.thresholds.critical_ppm),
        KEY_SMS_COOLDOWN => KvValue::U64(cfg.sms.cooldown_ms),
        KEY_WIFI_SSID => KvValue::Str(cfg.network.wifi_ssid.clone()),
        KEY_WIFI_PASS => KvValue::Str(cfg.network.wifi_pass.clone()),
        KEY_PPM_MODEL => KvValue::Str(cfg.gas.model.as_str().to_string()),
        KEY_PPM_A => KvValue::F32(cfg.gas.coefficients().0),
        KEY_PPM_B => KvValue::F32(cfg.gas.coefficients().1),
        KEY_RESET_BELOW => KvValue::F32(cfg.thresholds.reset_below),
        _ => return None,
    })
}

/// Parse `value` for the persisted `key` and apply it to `cfg`.
///
/// Used by the admin `config set` command; the caller validates and saves.
pub fn set_from_str(cfg: &mut Config, key: &str, value: &str) -> eyre::Result<()> {
    let f = || -> eyre::Result<f32> {
        value
            .trim()
            .parse::<f32>()
            .map_err(|e| eyre::eyre!("{key}: expected a number, got '{value}': {e}"))
    };
    match key {
        KEY_DEVICE_ID => cfg.device.device_id = value.trim().to_string(),
        KEY_R0 => cfg.gas.mq135_r0 = f()?,
        KEY_US_OFFSET => cfg.device.us_offset_cm = f()?,
        KEY_CRIT_CAP => cfg.thresholds.critical_fill = f()?,
        KEY_CRIT_GAS => cfg.thresholds.critical_ppm = f()?,
        KEY_SMS_COOLDOWN => {
            cfg.sms.cooldown_ms = value
                .trim()
                .parse::<u64>()
                .map_err(|e| eyre::eyre!("{key}: expected milliseconds, got '{value}': {e}"))?;
        }
        KEY_WIFI_SSID => cfg.network.wifi_ssid = value.to_string(),
        KEY_WIFI_PASS => cfg.network.wifi_pass = value.to_string(),
        KEY_PPM_MODEL => {
            let model = value.parse::<PpmModel>()?;
            if model != cfg.gas.model {
                // Coefficients belong to one model; drop stale overrides.
                cfg.gas.coeff_a = None;
                cfg.gas.coeff_b = None;
            }
            cfg.gas.model = model;
        }
        KEY_PPM_A => cfg.gas.coeff_a = Some(f()?),
        KEY_PPM_B => cfg.gas.coeff_b = Some(f()?),
        KEY_RESET_BELOW => cfg.thresholds.reset_below = f()?,
        other => eyre::bail!("unknown config key '{other}' (known: {})", KEYS.join(", ")),
    }
    Ok(())
}
