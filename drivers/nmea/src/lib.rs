//! GNSS NMEA Parser
//!
//! Pure Rust parser for the NMEA stream of a u-blox style GNSS receiver.
//! Bytes arrive in arbitrary chunks (UART reads are not sentence aligned), are
//! accumulated into a bounded line buffer and parsed on every `\n`.
//!
//! # Features
//!
//! - Zero-allocation parsing with a fixed 1024 byte line buffer
//! - GGA (position / fix quality / satellites) and RMC (time / validity / speed / course / date)
//! - Both sentence kinds merge into one fix record; missing fields keep their previous value
//! - Talker independent (GP, GN, GL, GA...) through marker substring matching
//! - Local coordinate helpers (lat/lon → meters)
//! - `no_std` compatible
//!
//! # Example
//!
//! ```no_run
//! use nmea_gps::NmeaParser;
//!
//! let mut parser = NmeaParser::new();
//! # let uart_bytes: &[u8] = b"";
//!
//! if parser.feed(uart_bytes) > 0 {
//!     let fix = parser.last_fix();
//!     if fix.valid {
//!         // fix.lat, fix.lon, fix.speed_kmh ...
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "logging")]
use log::warn;

use libm::trunc;

pub mod ubx;

/// Local coordinate approximations used by the timing gate
pub mod transforms {
    use libm::{cos, sqrt};

    /// Meters per degree of latitude (equirectangular approximation)
    pub const METERS_PER_DEGREE: f64 = 111320.0;

    /// Convert latitude difference to meters
    pub fn lat_to_meters(dlat: f64) -> f64 {
        dlat * METERS_PER_DEGREE
    }

    /// Convert longitude difference to meters at the given latitude
    pub fn lon_to_meters(dlon: f64, ref_lat: f64) -> f64 {
        dlon * METERS_PER_DEGREE * cos(ref_lat.to_radians())
    }

    /// Planar distance between two positions, scaled at `ref_lat`
    ///
    /// Good to a few centimeters over the tens of meters a timing gate spans.
    pub fn planar_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64, ref_lat: f64) -> f64 {
        let dy = lat_to_meters(lat2 - lat1);
        let dx = lon_to_meters(lon2 - lon1, ref_lat);
        sqrt(dx * dx + dy * dy)
    }
}

/// Capacity of the line accumulation buffer (bytes)
pub const LINE_CAPACITY: usize = 1024;

/// Fixed offset between receiver UTC and device local time (hours)
pub const LOCAL_UTC_OFFSET_HOURS: i8 = -3;

const KNOTS_TO_KMH: f32 = 1.852;

/// Enough for RMC (13 fields) and GGA (15 fields)
const MAX_FIELDS: usize = 20;

/// Latest merged positioning reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpsFix {
    /// Latitude in degrees (positive = North, negative = South)
    pub lat: f64,
    /// Longitude in degrees (positive = East, negative = West)
    pub lon: f64,
    /// Ground speed in km/h
    pub speed_kmh: f32,
    /// Course over ground in degrees (0-359)
    pub course: f32,
    /// Fix validity (GGA quality != 0, RMC status == A)
    pub valid: bool,
    /// Satellites used in the solution
    pub satellites: u8,
    /// Date (day of month, month, two-digit year)
    pub day: u8,
    pub month: u8,
    pub year: u8,
    /// Local time (UTC shifted by [`LOCAL_UTC_OFFSET_HOURS`])
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Monotonic receipt time (ms since device start), stamped by the fix store
    pub timestamp_ms: u64,
}

/// Recognized sentence kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceKind {
    /// GGA: position, fix quality, satellite count
    FixQuality,
    /// RMC: time, status, speed, course, date
    RecommendedMinimum,
}

impl SentenceKind {
    /// Classify a sentence by marker substring.
    ///
    /// Matching is deliberately lenient: any talker (`$GPGGA`, `$GNGGA`,
    /// `$GLGGA`...) is accepted, at the cost of also accepting an unrelated
    /// sentence that happens to contain the marker somewhere. GGA wins when
    /// both markers are present.
    pub fn classify(line: impl AsRef<[u8]>) -> Option<Self> {
        let line = line.as_ref();
        let has = |kind: Self| {
            line.windows(3).any(|window| window == kind.marker().as_bytes())
        };
        if has(Self::FixQuality) {
            Some(Self::FixQuality)
        } else if has(Self::RecommendedMinimum) {
            Some(Self::RecommendedMinimum)
        } else {
            None
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::FixQuality => "GGA",
            Self::RecommendedMinimum => "RMC",
        }
    }
}

/// Streaming NMEA parser with a bounded line buffer
pub struct NmeaParser {
    line_buffer: [u8; LINE_CAPACITY],
    line_len: usize,
    truncated: bool,
    overflowed_lines: u32,
    fix: GpsFix,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            line_buffer: [0; LINE_CAPACITY],
            line_len: 0,
            truncated: false,
            overflowed_lines: 0,
            fix: GpsFix::default(),
        }
    }

    /// Feed a single byte from the receiver
    ///
    /// Returns the kind of sentence that was applied when `byte` terminates a
    /// recognized line. Once the buffer is full further bytes are dropped
    /// until the next terminator, and the truncated line is still parsed.
    pub fn feed_byte(&mut self, byte: u8) -> Option<SentenceKind> {
        match byte {
            b'\n' => {
                let kind = self.parse_line();
                self.line_len = 0;
                if self.truncated {
                    self.truncated = false;
                    self.overflowed_lines = self.overflowed_lines.saturating_add(1);
                }
                kind
            }
            b'\r' => None,
            _ => {
                if self.line_len < LINE_CAPACITY {
                    self.line_buffer[self.line_len] = byte;
                    self.line_len += 1;
                } else if !self.truncated {
                    self.truncated = true;
                    #[cfg(feature = "logging")]
                    warn!("NMEA line exceeds {} bytes, dropping until newline", LINE_CAPACITY);
                }
                None
            }
        }
    }

    /// Feed a chunk of bytes. Returns the number of recognized sentences.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .filter(|&&byte| self.feed_byte(byte).is_some())
            .count()
    }

    /// Latest merged fix (copy)
    pub fn last_fix(&self) -> GpsFix {
        self.fix
    }

    /// Bytes currently waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.line_len
    }

    /// Number of lines that hit the buffer bound
    pub fn overflowed_lines(&self) -> u32 {
        self.overflowed_lines
    }

    fn parse_line(&mut self) -> Option<SentenceKind> {
        let line = &self.line_buffer[..self.line_len];
        let kind = SentenceKind::classify(line)?;
        let fields = Fields::split(line);

        match kind {
            SentenceKind::FixQuality => apply_gga(&mut self.fix, &fields),
            SentenceKind::RecommendedMinimum => apply_rmc(&mut self.fix, &fields),
        }

        Some(kind)
    }
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional view over the comma separated fields of one sentence
///
/// Split on raw bytes so a corrupted field only loses itself.
struct Fields<'a> {
    items: [&'a [u8]; MAX_FIELDS],
    len: usize,
}

impl<'a> Fields<'a> {
    fn split(line: &'a [u8]) -> Self {
        let mut items: [&[u8]; MAX_FIELDS] = [&[][..]; MAX_FIELDS];
        let mut len = 0;
        for field in line.split(|&byte| byte == b',').take(MAX_FIELDS) {
            items[len] = field;
            len += 1;
        }
        Self { items, len }
    }

    /// Field at `index`, `None` when absent, empty or not UTF-8
    fn get(&self, index: usize) -> Option<&'a str> {
        if index >= self.len {
            return None;
        }
        let field = core::str::from_utf8(self.items[index]).ok()?.trim();
        (!field.is_empty()).then_some(field)
    }
}

/// $xxGGA,time,lat,N/S,lon,E/W,quality,sats,hdop,alt,M,...
fn apply_gga(fix: &mut GpsFix, fields: &Fields) {
    if let Some(lat) = fields
        .get(2)
        .and_then(parse_packed_degrees)
        .map(|lat| apply_hemisphere(lat, fields.get(3), 'S'))
    {
        fix.lat = lat;
    }

    if let Some(lon) = fields
        .get(4)
        .and_then(parse_packed_degrees)
        .map(|lon| apply_hemisphere(lon, fields.get(5), 'W'))
    {
        fix.lon = lon;
    }

    if let Some(quality) = fields.get(6).and_then(|q| q.bytes().next()) {
        match quality {
            b'0' => fix.valid = false,
            b'1'..=b'9' => fix.valid = true,
            _ => {}
        }
    }

    if let Some(sats) = fields.get(7).and_then(|s| s.parse::<u8>().ok()) {
        fix.satellites = sats;
    }
}

/// $xxRMC,hhmmss.ss,A,lat,N/S,lon,E/W,knots,course,ddmmyy,...
fn apply_rmc(fix: &mut GpsFix, fields: &Fields) {
    if let Some((h, m, s)) = fields.get(1).and_then(parse_time) {
        fix.hour = to_local_hour(h);
        fix.minute = m;
        fix.second = s;
    }

    if let Some(status) = fields.get(2) {
        fix.valid = status.starts_with('A');
    }

    if let Some(knots) = fields
        .get(7)
        .and_then(|k| k.parse::<f32>().ok())
        .filter(|k| k.is_finite() && *k >= 0.0)
    {
        fix.speed_kmh = knots * KNOTS_TO_KMH;
    }

    if let Some(course) = fields
        .get(8)
        .and_then(|c| c.parse::<f32>().ok())
        .filter(|c| (0.0..=360.0).contains(c))
    {
        fix.course = course;
    }

    if let Some((day, month, year)) = fields.get(9).and_then(parse_date) {
        fix.day = day;
        fix.month = month;
        fix.year = year;
    }
}

/// Packed `DDMM.MMMM` / `DDDMM.MMMM` to decimal degrees (unsigned)
pub fn parse_packed_degrees(raw: &str) -> Option<f64> {
    let value = raw.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let whole = trunc(value / 100.0);
    Some(whole + (value - whole * 100.0) / 60.0)
}

fn apply_hemisphere(value: f64, hemisphere: Option<&str>, negative: char) -> f64 {
    match hemisphere {
        Some(h) if h.starts_with(negative) => -value,
        _ => value,
    }
}

/// UTC hour to device local hour, wrapping at midnight
///
/// With the -3 h offset this is `h < 3 ? h + 21 : h - 3`.
pub fn to_local_hour(utc_hour: u8) -> u8 {
    (i16::from(utc_hour) + 24 + i16::from(LOCAL_UTC_OFFSET_HOURS)).rem_euclid(24) as u8
}

fn two_digits(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [a @ b'0'..=b'9', b @ b'0'..=b'9', ..] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}

/// Parse `hhmmss[.ss]`
fn parse_time(raw: &str) -> Option<(u8, u8, u8)> {
    let bytes = raw.as_bytes();
    if bytes.len() < 6 {
        return None;
    }

    let h = two_digits(&bytes[0..2])?;
    let m = two_digits(&bytes[2..4])?;
    let s = two_digits(&bytes[4..6])?;

    (h < 24 && m < 60 && s <= 60).then_some((h, m, s))
}

/// Parse `ddmmyy`
fn parse_date(raw: &str) -> Option<(u8, u8, u8)> {
    let bytes = raw.as_bytes();
    if bytes.len() < 6 {
        return None;
    }

    let day = two_digits(&bytes[0..2])?;
    let month = two_digits(&bytes[2..4])?;
    let year = two_digits(&bytes[4..6])?;

    ((1..=31).contains(&day) && (1..=12).contains(&month)).then_some((day, month, year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &[u8] =
        b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_packed_degrees_southern() {
        let lat = apply_hemisphere(parse_packed_degrees("2306.1234").unwrap(), Some("S"), 'S');
        assert!(approx(lat, -(23.0 + 6.1234 / 60.0)));
    }

    #[test]
    fn test_packed_degrees_longitude() {
        let lon = apply_hemisphere(parse_packed_degrees("12158.3416").unwrap(), Some("W"), 'W');
        assert!(approx(lon, -(121.0 + 58.3416 / 60.0)));
        assert_eq!(parse_packed_degrees("abc"), None);
        assert_eq!(parse_packed_degrees("-12.0"), None);
    }

    #[test]
    fn test_local_hour_shift() {
        assert_eq!(to_local_hour(23), 20);
        assert_eq!(to_local_hour(2), 23);
        assert_eq!(to_local_hour(3), 0);
        assert_eq!(to_local_hour(0), 21);
    }

    #[test]
    fn test_parse_time_and_date() {
        assert_eq!(parse_time("235959"), Some((23, 59, 59)));
        assert_eq!(parse_time("123456.00"), Some((12, 34, 56)));
        assert_eq!(parse_time("12"), None);
        assert_eq!(parse_time("2a3456"), None);
        assert_eq!(parse_time("993456"), None);
        assert_eq!(parse_date("230394"), Some((23, 3, 94)));
        assert_eq!(parse_date("001394"), None);
    }

    #[test]
    fn test_classify_is_talker_independent() {
        assert_eq!(SentenceKind::classify("$GNGGA,..."), Some(SentenceKind::FixQuality));
        assert_eq!(SentenceKind::classify("$GLRMC,..."), Some(SentenceKind::RecommendedMinimum));
        assert_eq!(SentenceKind::classify("$GPGSV,3,1,11"), None);
        // Known over-match: marker inside an unrelated sentence
        assert_eq!(SentenceKind::classify("$PUBX,RMC"), Some(SentenceKind::RecommendedMinimum));
    }

    #[test]
    fn test_gga_sentence() {
        let mut parser = NmeaParser::new();
        assert_eq!(parser.feed(GGA), 1);

        let fix = parser.last_fix();
        assert!(fix.valid);
        assert_eq!(fix.satellites, 8);
        assert!(approx(fix.lat, 48.0 + 7.038 / 60.0));
        assert!(approx(fix.lon, 11.0 + 31.0 / 60.0));
    }

    #[test]
    fn test_rmc_sentence() {
        let mut parser = NmeaParser::new();
        assert_eq!(parser.feed(RMC), 1);

        let fix = parser.last_fix();
        assert!(fix.valid);
        assert_eq!((fix.hour, fix.minute, fix.second), (9, 35, 19));
        assert_eq!((fix.day, fix.month, fix.year), (23, 3, 94));
        assert!((fix.speed_kmh - 22.4 * 1.852).abs() < 1e-4);
        assert!((fix.course - 84.4).abs() < 1e-4);
        // RMC does not carry satellites: untouched
        assert_eq!(fix.satellites, 0);
    }

    #[test]
    fn test_rmc_void_status_invalidates() {
        let mut parser = NmeaParser::new();
        parser.feed(GGA);
        parser.feed(b"$GNRMC,010203,V,,,,,,,,,,N*00\n");

        let fix = parser.last_fix();
        assert!(!fix.valid);
        // Empty fields keep previous values
        assert!(approx(fix.lat, 48.0 + 7.038 / 60.0));
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.hour, 22);
    }

    #[test]
    fn test_gga_zero_quality() {
        let mut parser = NmeaParser::new();
        parser.feed(b"$GPGGA,000000,,,,,0,03,,,,,,,*00\n");
        let fix = parser.last_fix();
        assert!(!fix.valid);
        assert_eq!(fix.satellites, 3);
    }

    #[test]
    fn test_fragmented_chunks() {
        let mut parser = NmeaParser::new();
        let (head, tail) = RMC.split_at(17);
        assert_eq!(parser.feed(head), 0);
        assert_eq!(parser.pending_len(), 17);
        assert_eq!(parser.feed(tail), 1);
        assert_eq!(parser.pending_len(), 0);
        assert!(parser.last_fix().valid);
    }

    #[test]
    fn test_unrecognized_sentence_ignored() {
        let mut parser = NmeaParser::new();
        assert_eq!(parser.feed(b"$GPGSV,3,1,11,03,03,111,00*74\n"), 0);
        assert_eq!(parser.last_fix(), GpsFix::default());
    }

    #[test]
    fn test_overflow_drops_and_resyncs() {
        let mut parser = NmeaParser::new();
        let junk = [b'x'; LINE_CAPACITY + 100];
        assert_eq!(parser.feed(&junk), 0);
        assert_eq!(parser.pending_len(), LINE_CAPACITY);
        assert_eq!(parser.feed(b"\n"), 0);
        assert_eq!(parser.overflowed_lines(), 1);

        // Next sentence parses normally
        assert_eq!(parser.feed(GGA), 1);
        assert!(parser.last_fix().valid);
    }

    #[test]
    fn test_truncated_line_still_parsed() {
        let mut parser = NmeaParser::new();
        let mut line = GGA[..GGA.len() - 2].to_vec();
        line.extend_from_slice(&[b'x'; LINE_CAPACITY]);
        line.push(b'\n');

        assert_eq!(parser.feed(&line), 1);
        assert_eq!(parser.overflowed_lines(), 1);
        assert_eq!(parser.last_fix().satellites, 8);
    }

    #[test]
    fn test_corrupt_field_skipped_alone() {
        let mut parser = NmeaParser::new();
        // Bad byte in the altitude field only
        let mut line = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,54".to_vec();
        line.push(0xFF);
        line.extend_from_slice(b",M,46.9,M,,*47\r\n");
        assert_eq!(parser.feed(&line), 1);

        let fix = parser.last_fix();
        assert!(fix.valid);
        assert_eq!(fix.satellites, 8);
        assert!(approx(fix.lat, 48.0 + 7.038 / 60.0));
        assert!(approx(fix.lon, 11.0 + 31.0 / 60.0));
    }

    #[test]
    fn test_transforms() {
        use transforms::*;

        let dist = planar_distance(37.0, -122.0, 37.0001, -122.0, 37.0);
        assert!((dist - 11.132).abs() < 0.01);

        let east = lon_to_meters(0.0001, 0.0);
        assert!((east - 11.132).abs() < 0.01);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_arbitrary_bytes_never_grow_buffer(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut parser = NmeaParser::new();
            parser.feed(&bytes);
            prop_assert!(parser.pending_len() <= LINE_CAPACITY);
        }

        #[test]
        fn prop_local_hour_in_range(hour in 0u8..24) {
            let local = to_local_hour(hour);
            prop_assert!(local < 24);
            let expected = if hour < 3 { hour + 21 } else { hour - 3 };
            prop_assert_eq!(local, expected);
        }
    }
}
