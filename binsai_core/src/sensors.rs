//! Sensor readers: ultrasonic distance, gas concentration and GPS validity.
use std::time::Duration;

use binsai_traits::{AnalogIn, GpsParser, GpsReading, SerialPort, Ultrasonic};
use tracing::{debug, info, warn};

use crate::calibration::PpmConverter;
use crate::error::BinsaiError;
use crate::filter::RollingMean;
use crate::hw_error::map_box;
use crate::schedule::Ticker;
use crate::types::GeoFix;

/// Centimetres per microsecond of echo (343 m/s, halved for the round trip).
pub const CM_PER_US: f32 = 0.017_15;
pub const DISTANCE_MIN_CM: f32 = 2.0;
pub const DISTANCE_MAX_CM: f32 = 400.0;
pub const ECHO_TIMEOUT: Duration = Duration::from_millis(30);
/// Consecutive echo timeouts before the pins are re-initialised.
pub const REINIT_AFTER_TIMEOUTS: u32 = 10;

pub const GAS_BURST: u32 = 10;
pub const GAS_BURST_SPACING_MS: u64 = 10;

pub const GPS_MIN_SATS: u32 = 3;
pub const GPS_MAX_HDOP: f32 = 5.0;
pub const GPS_MAX_AGE_MS: u64 = 10_000;

pub const FILTER_LEN: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DistanceCounters {
    pub timeouts: u32,
    pub out_of_range: u32,
    pub device_errors: u32,
    pub reinits: u32,
}

#[derive(Debug, Default)]
pub struct DistanceReader {
    offset_cm: f32,
    filter: RollingMean<FILTER_LEN>,
    consecutive_timeouts: u32,
    pub counters: DistanceCounters,
}

impl DistanceReader {
    pub fn new(offset_cm: f32) -> Self {
        Self {
            offset_cm,
            ..Self::default()
        }
    }

    /// One ping. Returns the distance rounded to 1 mm, or the reason it was dropped.
    pub fn ping(&mut self, dev: &mut dyn Ultrasonic) -> Result<f32, BinsaiError> {
        let width = match dev.echo_width_us(ECHO_TIMEOUT) {
            Ok(w) => w,
            Err(e) => {
                self.counters.device_errors += 1;
                return Err(map_box(&e));
            }
        };
        if width == 0 {
            self.counters.timeouts += 1;
            self.consecutive_timeouts += 1;
            if self.consecutive_timeouts >= REINIT_AFTER_TIMEOUTS {
                self.consecutive_timeouts = 0;
                self.counters.reinits += 1;
                warn!(timeouts = self.counters.timeouts, "ultrasonic silent; re-initialising pins");
                if let Err(e) = dev.reinit() {
                    warn!(error = %e, "ultrasonic re-init failed");
                }
            }
            return Err(BinsaiError::SensorTimeout);
        }
        self.consecutive_timeouts = 0;
        #[allow(clippy::cast_precision_loss)]
        let cm = width as f32 * CM_PER_US + self.offset_cm;
        if !(DISTANCE_MIN_CM..=DISTANCE_MAX_CM).contains(&cm) {
            self.counters.out_of_range += 1;
            return Err(BinsaiError::SensorOutOfRange(format!("{cm:.1} cm")));
        }
        Ok((cm * 10.0).round() / 10.0)
    }

    /// Ping once and fold the result into the rolling mean.
    /// Returns the filtered distance (unchanged on a dropped sample).
    pub fn read(&mut self, dev: &mut dyn Ultrasonic) -> (Option<f32>, Option<BinsaiError>) {
        match self.ping(dev) {
            Ok(cm) => (self.filter.push(Some(cm)), None),
            Err(e) => {
                debug!(error = %e, "distance sample dropped");
                (self.filter.mean(), Some(e))
            }
        }
    }

    pub fn filtered(&self) -> Option<f32> {
        self.filter.mean()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasSample {
    pub adc_mean: f32,
    pub ppm_instant: f32,
    pub ppm_filtered: f32,
}

#[derive(Debug)]
pub struct GasReader {
    conv: PpmConverter,
    filter: RollingMean<FILTER_LEN>,
    pub errors: u32,
}

impl GasReader {
    pub fn new(conv: PpmConverter) -> Self {
        Self {
            conv,
            filter: RollingMean::new(),
            errors: 0,
        }
    }

    pub fn converter(&self) -> &PpmConverter {
        &self.conv
    }

    pub fn set_r0(&mut self, r0_kohm: f32) {
        self.conv.r0_kohm = r0_kohm;
    }

    /// Burst of `GAS_BURST` conversions `GAS_BURST_SPACING_MS` apart, averaged.
    pub fn read(&mut self, adc: &mut dyn AnalogIn, ticker: &Ticker) -> Result<GasSample, BinsaiError> {
        let mut sum = 0u32;
        for i in 0..GAS_BURST {
            if i > 0 {
                ticker.sleep_ms(GAS_BURST_SPACING_MS);
            }
            match adc.read_raw() {
                Ok(v) => sum += u32::from(v),
                Err(e) => {
                    self.errors += 1;
                    return Err(map_box(&e));
                }
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let adc_mean = sum as f32 / GAS_BURST as f32;
        let ppm_instant = self.conv.ppm(adc_mean);
        let ppm_filtered = self.filter.push(Some(ppm_instant)).unwrap_or(ppm_instant);
        Ok(GasSample {
            adc_mean,
            ppm_instant,
            ppm_filtered,
        })
    }
}

/// Keeps the latest GPS reading and applies the validity rule.
#[derive(Debug, Default)]
pub struct GpsTracker {
    last: Option<(GpsReading, u64)>,
    first_fix_seen: bool,
    pub bytes: u64,
    pub read_errors: u32,
}

/// Upper bound on bytes consumed per drain, so a babbling receiver cannot stall the tick.
const GPS_DRAIN_LIMIT: usize = 4096;

impl GpsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed every buffered UART byte to the parser. Returns true exactly once:
    /// on the tick the first valid fix appears.
    pub fn drain(&mut self, port: &mut dyn SerialPort, parser: &mut dyn GpsParser, now_ms: u64) -> bool {
        let mut buf = [0u8; 64];
        let mut taken = 0usize;
        while taken < GPS_DRAIN_LIMIT {
            let n = match port.read_available(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.read_errors += 1;
                    debug!(error = %e, "gps uart read failed");
                    break;
                }
            };
            if n == 0 {
                break;
            }
            buf[..n].iter().for_each(|b| parser.feed(*b));
            taken += n;
        }
        self.bytes += taken as u64;
        if let Some(r) = parser.take_update() {
            self.last = Some((r, now_ms));
        }
        if !self.first_fix_seen && self.fix(now_ms).is_some() {
            self.first_fix_seen = true;
            info!("first GPS fix");
            return true;
        }
        false
    }

    /// The current fix if it has ≥ 3 satellites, HDOP < 5 and is fresher than 10 s.
    pub fn fix(&self, now_ms: u64) -> Option<GeoFix> {
        let (r, at) = self.last?;
        let age = now_ms.saturating_sub(at);
        (r.sats >= GPS_MIN_SATS && r.hdop < GPS_MAX_HDOP && age < GPS_MAX_AGE_MS).then_some(GeoFix {
            lat: r.lat,
            lon: r.lon,
            sats: r.sats,
            hdop: r.hdop,
            fix_age_ms: age,
        })
    }

    pub fn has_had_fix(&self) -> bool {
        self.first_fix_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsai_traits::BoxError;

    struct Echo(Vec<u32>, usize, u32);
    impl Ultrasonic for Echo {
        fn echo_width_us(&mut self, _t: Duration) -> Result<u32, BoxError> {
            let v = self.0[self.1.min(self.0.len() - 1)];
            self.1 += 1;
            Ok(v)
        }
        fn reinit(&mut self) -> Result<(), BoxError> {
            self.2 += 1;
            Ok(())
        }
    }

    #[test]
    fn width_converts_with_offset_and_rounding() {
        let mut r = DistanceReader::new(1.0);
        let mut dev = Echo(vec![1166], 0, 0);
        assert_eq!(r.ping(&mut dev).unwrap(), 21.0);
    }

    #[test]
    fn out_of_window_samples_dropped() {
        let mut r = DistanceReader::new(0.0);
        let mut dev = Echo(vec![50, 30_000], 0, 0);
        assert!(matches!(r.ping(&mut dev), Err(BinsaiError::SensorOutOfRange(_))));
        assert!(matches!(r.ping(&mut dev), Err(BinsaiError::SensorOutOfRange(_))));
        assert_eq!(r.counters.out_of_range, 2);
        assert_eq!(r.filtered(), None);
    }

    #[test]
    fn reinit_after_ten_consecutive_timeouts() {
        let mut r = DistanceReader::new(0.0);
        let mut dev = Echo(vec![0], 0, 0);
        for _ in 0..9 {
            let _ = r.read(&mut dev);
        }
        assert_eq!(dev.2, 0);
        let _ = r.read(&mut dev);
        assert_eq!(dev.2, 1);
        assert_eq!(r.counters.timeouts, 10);
        assert_eq!(r.counters.reinits, 1);
    }

    #[test]
    fn valid_echo_resets_timeout_streak() {
        let mut r = DistanceReader::new(0.0);
        let mut widths = vec![0; 9];
        widths.push(1166);
        widths.extend([0; 9]);
        let mut dev = Echo(widths, 0, 0);
        for _ in 0..19 {
            let _ = r.read(&mut dev);
        }
        assert_eq!(dev.2, 0);
        assert_eq!(r.filtered(), Some(20.0));
    }

    struct OneFix(Option<GpsReading>);
    impl GpsParser for OneFix {
        fn feed(&mut self, _b: u8) {}
        fn take_update(&mut self) -> Option<GpsReading> {
            self.0.take()
        }
    }
    struct Quiet;
    impl SerialPort for Quiet {
        fn write(&mut self, _b: &[u8]) -> Result<(), BoxError> {
            Ok(())
        }
        fn read_available(&mut self, _b: &mut [u8]) -> Result<usize, BoxError> {
            Ok(0)
        }
    }

    #[test]
    fn gps_validity_rule() {
        let reading = |sats, hdop| GpsReading {
            lat: -6.2,
            lon: 106.8,
            sats,
            hdop,
        };
        let mut g = GpsTracker::new();
        assert!(!g.drain(&mut Quiet, &mut OneFix(Some(reading(2, 1.0))), 0));
        assert!(g.fix(0).is_none());
        assert!(!g.drain(&mut Quiet, &mut OneFix(Some(reading(5, 6.0))), 100));
        assert!(g.fix(100).is_none());
        assert!(g.drain(&mut Quiet, &mut OneFix(Some(reading(5, 1.5))), 200));
        assert_eq!(g.fix(5_000).map(|f| f.fix_age_ms), Some(4_800));
        assert!(g.fix(10_200).is_none());
        // first-fix notification only once
        assert!(!g.drain(&mut Quiet, &mut OneFix(Some(reading(6, 1.0))), 11_000));
    }
}
