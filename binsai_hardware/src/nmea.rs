//! Minimal NMEA 0183 decoder: GGA sentences only.
//!
//! GGA carries everything the monitor needs (position, satellites in use,
//! HDOP); other talkers and sentence types are ignored.
use binsai_traits::{GpsParser, GpsReading};

const MAX_SENTENCE: usize = 96;

#[derive(Debug, Default)]
pub struct NmeaParser {
    line: Vec<u8>,
    in_sentence: bool,
    latest: Option<GpsReading>,
    /// Sentences rejected for bad checksum or syntax
    pub rejected: u32,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_sentence(&mut self) {
        let line = std::mem::take(&mut self.line);
        self.in_sentence = false;
        let Ok(text) = std::str::from_utf8(&line) else {
            self.rejected += 1;
            return;
        };
        match parse_sentence(text.trim_end_matches('\r')) {
            Ok(Some(r)) => self.latest = Some(r),
            Ok(None) => {}
            Err(()) => self.rejected += 1,
        }
    }
}

impl GpsParser for NmeaParser {
    fn feed(&mut self, byte: u8) {
        match byte {
            b'$' => {
                self.line.clear();
                self.in_sentence = true;
            }
            b'\n' if self.in_sentence => self.finish_sentence(),
            _ if self.in_sentence => {
                if self.line.len() >= MAX_SENTENCE {
                    self.line.clear();
                    self.in_sentence = false;
                    self.rejected += 1;
                } else {
                    self.line.push(byte);
                }
            }
            _ => {}
        }
    }

    fn take_update(&mut self) -> Option<GpsReading> {
        self.latest.take()
    }
}

fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// `body` is the sentence without the leading `$`.
/// Ok(None): well-formed but carries no location (other type, or no fix).
fn parse_sentence(body: &str) -> Result<Option<GpsReading>, ()> {
    let payload = match body.split_once('*') {
        Some((payload, sum)) => {
            let want = u8::from_str_radix(sum.trim(), 16).map_err(|_| ())?;
            if checksum(payload) != want {
                return Err(());
            }
            payload
        }
        None => body,
    };
    let mut fields = payload.split(',');
    let tag = fields.next().ok_or(())?;
    if tag.len() != 5 || !tag.ends_with("GGA") {
        return Ok(None);
    }
    let f: Vec<&str> = fields.collect();
    if f.len() < 8 {
        return Err(());
    }
    let quality: u8 = f[5].parse().unwrap_or(0);
    if quality == 0 || f[1].is_empty() || f[3].is_empty() {
        return Ok(None);
    }
    let lat = parse_coord(f[1], f[2], 2)?;
    let lon = parse_coord(f[3], f[4], 3)?;
    let sats = f[6].parse().unwrap_or(0);
    let hdop = f[7].parse().unwrap_or(99.9);
    Ok(Some(GpsReading {
        lat,
        lon,
        sats,
        hdop,
    }))
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees.
fn parse_coord(value: &str, hemi: &str, deg_digits: usize) -> Result<f64, ()> {
    if value.len() <= deg_digits || !value.is_char_boundary(deg_digits) {
        return Err(());
    }
    let (d, m) = value.split_at(deg_digits);
    let deg: f64 = d.parse().map_err(|_| ())?;
    let min: f64 = m.parse().map_err(|_| ())?;
    if !(0.0..60.0).contains(&min) {
        return Err(());
    }
    let v = deg + min / 60.0;
    match hemi {
        "N" | "E" => Ok(v),
        "S" | "W" => Ok(-v),
        _ => Err(()),
    }
}

/// Render a GGA sentence (with checksum and CRLF) for a fix.
pub fn format_gga(lat: f64, lon: f64, sats: u32, hdop: f32) -> String {
    let split = |v: f64| {
        let a = v.abs();
        let deg = a.trunc();
        (deg as u32, (a - deg) * 60.0)
    };
    let (lat_d, lat_m) = split(lat);
    let (lon_d, lon_m) = split(lon);
    let body = format!(
        "GPGGA,000000.00,{lat_d:02}{lat_m:07.4},{},{lon_d:03}{lon_m:07.4},{},1,{sats:02},{hdop:.1},10.0,M,0.0,M,,",
        if lat < 0.0 { 'S' } else { 'N' },
        if lon < 0.0 { 'W' } else { 'E' },
    );
    format!("${body}*{:02X}\r\n", checksum(&body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(p: &mut NmeaParser, s: &str) {
        for b in s.bytes() {
            p.feed(b);
        }
    }

    #[test]
    fn decodes_reference_sentence() {
        let mut p = NmeaParser::new();
        feed_str(
            &mut p,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n",
        );
        let r = p.take_update().expect("fix");
        assert!((r.lat - 48.1173).abs() < 1e-4);
        assert!((r.lon - 11.516_666).abs() < 1e-4);
        assert_eq!(r.sats, 8);
        assert!((r.hdop - 0.9).abs() < 1e-6);
        assert!(p.take_update().is_none());
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut p = NmeaParser::new();
        feed_str(
            &mut p,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48\r\n",
        );
        assert!(p.take_update().is_none());
        assert_eq!(p.rejected, 1);
    }

    #[test]
    fn no_fix_and_other_sentences_are_ignored() {
        let mut p = NmeaParser::new();
        feed_str(&mut p, "$GPGGA,000000.00,,,,,0,00,99.9,,M,,M,,\r\n");
        feed_str(&mut p, "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,,\r\n");
        assert!(p.take_update().is_none());
        assert_eq!(p.rejected, 0);
    }

    #[test]
    fn formatted_sentence_parses_back() {
        let mut p = NmeaParser::new();
        feed_str(&mut p, &format_gga(-6.200_000, 106.816_666, 7, 1.2));
        let r = p.take_update().expect("fix");
        assert!((r.lat + 6.2).abs() < 1e-4);
        assert!((r.lon - 106.816_666).abs() < 1e-4);
        assert_eq!(r.sats, 7);
    }

    #[test]
    fn garbage_before_dollar_is_skipped() {
        let mut p = NmeaParser::new();
        feed_str(&mut p, "\x00\x7fnoise");
        feed_str(&mut p, &format_gga(1.0, 2.0, 4, 2.0));
        assert!(p.take_update().is_some());
    }
}
