#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Config schemas, persisted settings and gas-sensor campaign parsing.
//!
//! - `Config` and its sections are deserialized from a provisioning TOML and validated.
//! - `store::ConfigStore` overlays the values persisted in the key/value area.
//! - The campaign CSV loader fits the power-law PPM coefficients.
use serde::{Deserialize, Serialize};

pub mod store;

pub use store::ConfigStore;

/// Gas-concentration model used to turn the ADC mean into PPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PpmModel {
    /// `ppm = A · ADC^B`
    #[default]
    Power,
    /// `ppm = A · (Rs/R0)^-B`
    Ratio,
}

impl PpmModel {
    pub const fn default_coefficients(self) -> (f32, f32) {
        match self {
            Self::Power => (0.002_348, 2.856),
            Self::Ratio => (116.6, 2.77),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Ratio => "ratio",
        }
    }
}

impl std::str::FromStr for PpmModel {
    type Err = eyre::Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "power" => Ok(Self::Power),
            "ratio" => Ok(Self::Ratio),
            other => eyre::bail!("unknown ppm model '{other}' (expected 'power' or 'ratio')"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Empty until derived from the MAC on first boot.
    pub device_id: String,
    pub bin_height_cm: f32,
    /// Added to every ultrasonic distance (mounting offset).
    pub us_offset_cm: f32,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            bin_height_cm: 40.0,
            us_offset_cm: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub critical_fill: f32,
    pub critical_ppm: f32,
    /// Fill percent below which a fired alert rearms
    pub reset_below: f32,
    /// Also alert on fill alone (gas normal)
    pub fill_only_alerts: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_fill: 90.0,
            critical_ppm: 800.0,
            reset_below: 80.0,
            fill_only_alerts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GasCfg {
    pub mq135_r0: f32,
    pub temp_comp: f32,
    pub hum_comp: f32,
    pub model: PpmModel,
    /// Model coefficient A; model default when absent
    pub coeff_a: Option<f32>,
    /// Model coefficient B; model default when absent
    pub coeff_b: Option<f32>,
    /// Load resistor on the sensor board (kΩ)
    pub load_resistor_kohm: f32,
    /// Sensor heater/divider supply (V)
    pub sensor_vcc: f32,
    /// ADC reference at full scale (V)
    pub adc_vref: f32,
}

impl Default for GasCfg {
    fn default() -> Self {
        Self {
            mq135_r0: 10.0,
            temp_comp: 1.0,
            hum_comp: 1.0,
            model: PpmModel::Power,
            coeff_a: None,
            coeff_b: None,
            load_resistor_kohm: 10.0,
            sensor_vcc: 5.0,
            adc_vref: 3.3,
        }
    }
}

impl GasCfg {
    /// Effective (A, B) for the selected model.
    pub fn coefficients(&self) -> (f32, f32) {
        let (a, b) = self.model.default_coefficients();
        (self.coeff_a.unwrap_or(a), self.coeff_b.unwrap_or(b))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkCfg {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub cloud_token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmsCfg {
    pub phone_numbers: Vec<String>,
    pub cooldown_ms: u64,
}

impl Default for SmsCfg {
    fn default() -> Self {
        Self {
            phone_numbers: Vec::new(),
            cooldown_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingCfg {
    pub sensor_period_ms: u64,
    pub publish_min_ms: u64,
    pub reconnect_ms: u64,
    pub display_rotate_ms: u64,
    pub health_period_ms: u64,
    pub loop_yield_ms: u64,
    /// Skip the boot R₀ routine and use the persisted value
    pub skip_boot_calibration: bool,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            sensor_period_ms: 2_000,
            publish_min_ms: 2_000,
            reconnect_ms: 30_000,
            display_rotate_ms: 4_000,
            health_period_ms: 10_000,
            loop_yield_ms: 10,
            skip_boot_calibration: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Raspberry Pi wiring. Pin numbers are BCM.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Hardware {
    pub trig_pin: u8,
    pub echo_pin: u8,
    pub buzzer_pin: u8,
    pub modem_power_pin: u8,
    pub gsm_uart: String,
    pub gsm_baud: u32,
    pub gps_uart: String,
    pub gps_baud: u32,
    /// MCP3008 channel wired to the gas sensor
    pub adc_channel: u8,
    pub lcd_i2c_addr: u16,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            trig_pin: 5,
            echo_pin: 18,
            buzzer_pin: 25,
            modem_power_pin: 4,
            gsm_uart: "/dev/ttyAMA0".into(),
            gsm_baud: 9_600,
            gps_uart: "/dev/ttyAMA1".into(),
            gps_baud: 9_600,
            adc_channel: 0,
            lcd_i2c_addr: 0x27,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub thresholds: Thresholds,
    pub gas: GasCfg,
    pub network: NetworkCfg,
    pub sms: SmsCfg,
    pub timing: TimingCfg,
    pub logging: Logging,
    pub hardware: Hardware,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn to_toml(cfg: &Config) -> eyre::Result<String> {
    toml::to_string_pretty(cfg).map_err(|e| eyre::eyre!("serialize config: {e}"))
}

fn finite_positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if !finite_positive(self.device.bin_height_cm) || self.device.bin_height_cm > 400.0 {
            eyre::bail!("device.bin_height_cm must be in (0, 400]");
        }
        if !self.device.us_offset_cm.is_finite() || self.device.us_offset_cm.abs() > 50.0 {
            eyre::bail!("device.us_offset_cm must be within ±50 cm");
        }
        if self.device.device_id.len() > 32 {
            eyre::bail!("device.device_id must be at most 32 characters");
        }

        // Thresholds
        let t = &self.thresholds;
        if !(t.critical_fill > 0.0 && t.critical_fill <= 100.0) {
            eyre::bail!("thresholds.critical_fill must be in (0, 100]");
        }
        if !(t.critical_ppm >= 0.0 && t.critical_ppm <= 2000.0) {
            eyre::bail!("thresholds.critical_ppm must be in [0, 2000]");
        }
        if !(t.reset_below >= 0.0 && t.reset_below <= t.critical_fill) {
            eyre::bail!("thresholds.reset_below must be in [0, critical_fill]");
        }

        // Gas
        let g = &self.gas;
        if !finite_positive(g.mq135_r0) {
            eyre::bail!("gas.mq135_r0 must be > 0");
        }
        if !finite_positive(g.temp_comp) {
            eyre::bail!("gas.temp_comp must be > 0");
        }
        if !finite_positive(g.hum_comp) {
            eyre::bail!("gas.hum_comp must be > 0");
        }
        let (a, b) = g.coefficients();
        if !finite_positive(a) {
            eyre::bail!("gas.coeff_a must be > 0");
        }
        if !finite_positive(b) {
            eyre::bail!("gas.coeff_b must be > 0");
        }
        if !finite_positive(g.load_resistor_kohm) {
            eyre::bail!("gas.load_resistor_kohm must be > 0");
        }
        if !finite_positive(g.sensor_vcc) || !finite_positive(g.adc_vref) {
            eyre::bail!("gas.sensor_vcc and gas.adc_vref must be > 0");
        }

        // SMS
        if self.sms.cooldown_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("sms.cooldown_ms is unreasonably large (>24h)");
        }
        if self.sms.phone_numbers.len() > 8 {
            eyre::bail!("sms.phone_numbers supports at most 8 recipients");
        }

        // Timing
        let tm = &self.timing;
        if tm.sensor_period_ms < 100 {
            eyre::bail!("timing.sensor_period_ms must be >= 100");
        }
        if tm.publish_min_ms == 0 {
            eyre::bail!("timing.publish_min_ms must be >= 1");
        }
        if tm.reconnect_ms < 1_000 {
            eyre::bail!("timing.reconnect_ms must be >= 1000");
        }
        if tm.display_rotate_ms == 0 {
            eyre::bail!("timing.display_rotate_ms must be >= 1");
        }
        if tm.health_period_ms == 0 {
            eyre::bail!("timing.health_period_ms must be >= 1");
        }
        if !(10..=1_000).contains(&tm.loop_yield_ms) {
            eyre::bail!("timing.loop_yield_ms must be in [10, 1000]");
        }

        // Hardware
        if self.hardware.adc_channel > 7 {
            eyre::bail!("hardware.adc_channel must be in [0, 7]");
        }
        if self.hardware.gsm_baud == 0 || self.hardware.gps_baud == 0 {
            eyre::bail!("hardware baud rates must be > 0");
        }

        Ok(())
    }
}

/// Calibration-campaign CSV schema.
///
/// Expected headers:
/// adc,ppm
///
/// Example:
/// adc,ppm
/// 60,280.0
/// 110,1560.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CampaignRow {
    pub adc: f32,
    pub ppm: f32,
}

/// Power-law coefficients `ppm = a · adc^b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawFit {
    pub a: f32,
    pub b: f32,
}

impl PowerLawFit {
    /// Least squares on `ln(ppm) = ln(a) + b·ln(adc)`.
    pub fn from_rows(rows: &[CampaignRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("campaign requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !(r.adc.is_finite() && r.adc > 0.0) || !(r.ppm.is_finite() && r.ppm > 0.0) {
                // +2: header line and 1-based numbering
                eyre::bail!("campaign row {} must have adc > 0 and ppm > 0", i + 2);
            }
        }

        let pts: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| (f64::from(r.adc).ln(), f64::from(r.ppm).ln()))
            .collect();
        let n = pts.len() as f64;
        let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
        let mut sxx = 0.0f64;
        let mut sxy = 0.0f64;
        for (x, y) in &pts {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if !sxx.is_finite() || sxx == 0.0 {
            eyre::bail!("campaign cannot determine exponent (all adc values equal)");
        }
        let b = sxy / sxx;
        let a = (mean_y - b * mean_x).exp();
        if !(a.is_finite() && a > 0.0) || !b.is_finite() || b <= 0.0 {
            eyre::bail!("campaign produced a non-increasing or non-finite curve (a={a}, b={b})");
        }
        Ok(Self {
            a: a as f32,
            b: b as f32,
        })
    }
}

pub fn load_campaign_csv(path: &std::path::Path) -> eyre::Result<PowerLawFit> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open campaign CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["adc", "ppm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "campaign CSV must have headers 'adc,ppm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CampaignRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    PowerLawFit::from_rows(&rows)
}
