//! Fault flags, counters and the periodic CSV diagnostics line.
use crate::classify::Classification;
use crate::error::BinsaiError;
use crate::types::SensorSnapshot;

pub const CSV_HEADER: &str =
    "t,distance,fill,ppm,adc,gps_valid,lat,lon,sats,capacity_ord,class_ord,priority";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCounters {
    pub ticks: u64,
    pub sensor_periods: u64,
    pub sensor_timeouts: u32,
    pub sensor_out_of_range: u32,
    pub sensor_reinits: u32,
    pub gas_errors: u32,
    pub alerts_fired: u32,
    pub alerts_suppressed: u32,
    pub alerts_cloud_only: u32,
    pub sms_batches: u32,
    pub sms_sent: u32,
    pub sms_failed: u32,
    pub publishes: u32,
    pub cloud_failures: u32,
    pub display_errors: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Health {
    pub wifi_ok: bool,
    pub cloud_ok: bool,
    pub gsm_ok: bool,
    pub gps_ok: bool,
    pub mq_calibrated: bool,
    pub display_ok: bool,
    pub last_error: Option<BinsaiError>,
    pub counters: HealthCounters,
}

impl Health {
    pub fn record(&mut self, err: BinsaiError) {
        self.last_error = Some(err);
    }

    pub fn last_error_kind(&self) -> &'static str {
        self.last_error.as_ref().map_or("none", BinsaiError::kind)
    }
}

/// One CSV record (no header) for the debug link.
pub fn csv_line(snap: &SensorSnapshot, cls: &Classification) -> Result<String, csv::Error> {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let gps = snap.gps;
    let record = [
        snap.t_ms.to_string(),
        opt(snap.distance_cm.map(|d| format!("{d:.1}"))),
        format!("{:.1}", cls.fill_percent),
        format!("{:.1}", cls.ppm),
        format!("{:.1}", snap.adc_raw),
        u8::from(gps.is_some()).to_string(),
        opt(gps.map(|g| format!("{:.6}", g.lat))),
        opt(gps.map(|g| format!("{:.6}", g.lon))),
        opt(gps.map(|g| g.sats.to_string())),
        cls.capacity.ordinal().to_string(),
        cls.waste_class.priority().to_string(),
        cls.priority.to_string(),
    ];
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(96));
    w.write_record(&record)?;
    let bytes = w.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::types::GeoFix;

    #[test]
    fn line_matches_header_columns() {
        let snap = SensorSnapshot {
            distance_cm: Some(20.0),
            fill_percent: 50.0,
            ppm: 300.0,
            adc_raw: 61.0,
            gps: None,
            t_ms: 12_000,
        };
        let line = csv_line(&snap, &classify(50.0, 300.0)).unwrap();
        assert_eq!(line, "12000,20.0,50.0,300.0,61.0,0,,,,1,1,1");
        assert_eq!(line.split(',').count(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn gps_columns_filled_when_valid() {
        let snap = SensorSnapshot {
            gps: Some(GeoFix {
                lat: -6.2,
                lon: 106.8,
                sats: 7,
                hdop: 0.9,
                fix_age_ms: 100,
            }),
            ..SensorSnapshot::default()
        };
        let line = csv_line(&snap, &classify(100.0, 0.0)).unwrap();
        assert!(line.contains(",1,-6.200000,106.800000,7,3,0,0"), "{line}");
    }

    #[test]
    fn error_kind_defaults_to_none() {
        let mut h = Health::default();
        assert_eq!(h.last_error_kind(), "none");
        h.record(BinsaiError::SensorTimeout);
        assert_eq!(h.last_error_kind(), "SensorTimeout");
    }
}
