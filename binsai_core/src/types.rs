//! Values produced by one sensor period.

/// A GPS position that passed the validity rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
    pub sats: u32,
    pub hdop: f32,
    pub fix_age_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    /// Filtered distance; `None` until a valid echo has been seen.
    pub distance_cm: Option<f32>,
    pub fill_percent: f32,
    pub ppm: f32,
    /// Mean of the last ADC burst (diagnostics).
    pub adc_raw: f32,
    pub gps: Option<GeoFix>,
    pub t_ms: u64,
}
