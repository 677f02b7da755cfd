//! Gas-sensor conversion (ADC → PPM) and the boot-time R₀ routine.
use binsai_config::{GasCfg, PpmModel};
use binsai_traits::AnalogIn;
use tracing::{debug, info, warn};

use crate::error::BinsaiError;
use crate::hw_error::map_box;
use crate::schedule::Ticker;

pub const PPM_MAX: f32 = 2000.0;
/// Rs/R0 of the MQ-135 in clean air.
pub const CLEAN_AIR_RATIO: f32 = 3.6;

/// Converts a mean ADC reading to a gas concentration.
#[derive(Debug, Clone, PartialEq)]
pub struct PpmConverter {
    pub model: PpmModel,
    pub a: f32,
    pub b: f32,
    pub temp_comp: f32,
    pub hum_comp: f32,
    pub r0_kohm: f32,
    pub load_kohm: f32,
    pub vcc: f32,
    pub vref: f32,
    pub full_scale: u16,
}

impl PpmConverter {
    pub fn from_config(gas: &GasCfg, full_scale: u16) -> Self {
        let (a, b) = gas.coefficients();
        Self {
            model: gas.model,
            a,
            b,
            temp_comp: gas.temp_comp,
            hum_comp: gas.hum_comp,
            r0_kohm: gas.mq135_r0,
            load_kohm: gas.load_resistor_kohm,
            vcc: gas.sensor_vcc,
            vref: gas.adc_vref,
            full_scale: full_scale.max(1),
        }
    }

    /// `R_s = ((V_cc / V_out) − 1) · R_L`; `None` when the output is at 0 V.
    pub fn sensor_resistance(&self, adc: f32) -> Option<f32> {
        let vout = adc / f32::from(self.full_scale) * self.vref;
        if !(vout.is_finite() && vout > 0.0) {
            return None;
        }
        Some(((self.vcc / vout) - 1.0).max(0.0) * self.load_kohm)
    }

    /// Concentration clipped to [0, 2000] ppm.
    pub fn ppm(&self, adc: f32) -> f32 {
        let comp = self.temp_comp * self.hum_comp;
        let raw = match self.model {
            PpmModel::Power => self.a * adc.max(0.0).powf(self.b) * comp,
            PpmModel::Ratio => match self.sensor_resistance(adc) {
                Some(rs) if rs > 0.0 => self.a * (rs / self.r0_kohm).powf(-self.b) * comp,
                // Output pinned at 0 V or at the rail: treat as no gas / saturated.
                Some(_) => PPM_MAX,
                None => 0.0,
            },
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, PPM_MAX)
        }
    }

    /// ADC reading that converts to roughly `ppm` (used by simulators).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn raw_for_ppm(&self, ppm: f32) -> u16 {
        let target = (ppm / (self.temp_comp * self.hum_comp)).max(f32::MIN_POSITIVE);
        let adc = match self.model {
            PpmModel::Power => (target / self.a).powf(1.0 / self.b),
            PpmModel::Ratio => {
                let ratio = (target / self.a).powf(-1.0 / self.b);
                let rs = ratio * self.r0_kohm;
                let vout = self.vcc / (rs / self.load_kohm + 1.0);
                vout / self.vref * f32::from(self.full_scale)
            }
        };
        adc.round().clamp(0.0, f32::from(self.full_scale)) as u16
    }
}

/// Parameters of the clean-air R₀ routine.
#[derive(Debug, Clone, Copy)]
pub struct R0Params {
    pub warmup_ms: u64,
    pub samples: u32,
    pub interval_ms: u64,
    pub max_rel_stdev: f32,
}

impl Default for R0Params {
    fn default() -> Self {
        Self {
            warmup_ms: 60_000,
            samples: 50,
            interval_ms: 500,
            max_rel_stdev: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct R0Outcome {
    pub r0_kohm: f32,
    pub mean_rs_kohm: f32,
    /// Sample standard deviation as a percentage of the mean
    pub stdev_pct: f32,
    pub samples: u32,
}

/// Mean and relative (population) standard deviation.
pub fn mean_and_rel_stdev(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let var = values
        .iter()
        .map(|v| (f64::from(*v) - mean).powi(2))
        .sum::<f64>()
        / n;
    #[allow(clippy::cast_possible_truncation)]
    Some((mean as f32, (var.sqrt() / mean) as f32))
}

/// Warm up, sample R_s in clean air and derive R₀.
///
/// Blocks for `warmup_ms + samples · interval_ms`. `progress` receives 0..=100.
/// An unstable run returns `CalibrationUnstable`; the caller keeps its prior R₀.
pub fn calibrate_r0(
    adc: &mut dyn AnalogIn,
    conv: &PpmConverter,
    ticker: &Ticker,
    params: R0Params,
    progress: &mut dyn FnMut(u32),
) -> Result<R0Outcome, BinsaiError> {
    let total = params.warmup_ms + u64::from(params.samples) * params.interval_ms;
    let pct = |done: u64| -> u32 {
        u32::try_from(done.saturating_mul(100) / total.max(1)).unwrap_or(100)
    };

    info!(warmup_ms = params.warmup_ms, samples = params.samples, "R0 calibration started");
    let mut waited = 0u64;
    while waited < params.warmup_ms {
        let step = (params.warmup_ms - waited).min(1_000);
        ticker.sleep_ms(step);
        waited += step;
        progress(pct(waited));
    }

    let mut rs = Vec::with_capacity(params.samples as usize);
    for i in 0..params.samples {
        ticker.sleep_ms(params.interval_ms);
        let raw = adc.read_raw().map_err(|e| map_box(&e))?;
        match conv.sensor_resistance(f32::from(raw)) {
            Some(v) if v > 0.0 => rs.push(v),
            _ => debug!(raw, "calibration sample rejected"),
        }
        progress(pct(params.warmup_ms + u64::from(i + 1) * params.interval_ms));
    }

    if rs.len() < params.samples as usize {
        return Err(BinsaiError::SensorOutOfRange(format!(
            "only {} of {} calibration samples usable",
            rs.len(),
            params.samples
        )));
    }
    let Some((mean, rel)) = mean_and_rel_stdev(&rs) else {
        return Err(BinsaiError::SensorOutOfRange("no usable calibration samples".into()));
    };
    if rel > params.max_rel_stdev {
        warn!(stdev_pct = rel * 100.0, "R0 calibration rejected");
        return Err(BinsaiError::CalibrationUnstable {
            stdev_pct: rel * 100.0,
        });
    }
    let out = R0Outcome {
        r0_kohm: mean / CLEAN_AIR_RATIO,
        mean_rs_kohm: mean,
        stdev_pct: rel * 100.0,
        samples: u32::try_from(rs.len()).unwrap_or(u32::MAX),
    };
    info!(r0 = out.r0_kohm, stdev_pct = out.stdev_pct, "R0 calibration accepted");
    Ok(out)
}
