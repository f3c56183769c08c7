//! Latest fix plus receiver liveness
//!
//! The store owns the sentence parser. Any non-empty chunk counts as
//! communication, even when it holds no complete sentence yet.

use nmea_gps::{GpsFix, NmeaParser};
use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;

/// Receiver status shown to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsStatus {
    /// No bytes from the receiver within the link timeout
    Disconnected,
    /// Talking, no fix, no satellites
    Off,
    /// Talking, no fix, satellites in view
    Searching,
    /// Talking with a valid fix
    Fixed,
}

impl GpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "NO GPS",
            Self::Off => "GPS OFF",
            Self::Searching => "SEARCHING",
            Self::Fixed => "FIX",
        }
    }
}

pub struct FixStore {
    parser: NmeaParser,
    fix: GpsFix,
    last_rx_ms: Option<u64>,
    link_timeout_ms: u64,
    sentences: u64,
}

impl FixStore {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            parser: NmeaParser::new(),
            fix: GpsFix::default(),
            last_rx_ms: None,
            link_timeout_ms: config.link_timeout_ms,
            sentences: 0,
        }
    }

    /// Feed raw receiver bytes. Returns the number of sentences applied.
    ///
    /// Every applied sentence republishes the merged fix stamped with `now_ms`.
    pub fn ingest(&mut self, bytes: &[u8], now_ms: u64) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        self.last_rx_ms = Some(now_ms);

        let parsed = self.parser.feed(bytes);
        if parsed > 0 {
            self.fix = GpsFix {
                timestamp_ms: now_ms,
                ..self.parser.last_fix()
            };
            self.sentences += parsed as u64;
        }
        parsed
    }

    /// Latest fix by value
    pub fn latest(&self) -> GpsFix {
        self.fix
    }

    pub fn is_communicating(&self, now_ms: u64) -> bool {
        self.last_rx_ms
            .is_some_and(|rx| now_ms.saturating_sub(rx) < self.link_timeout_ms)
    }

    /// Derived on every call, never cached
    pub fn status(&self, now_ms: u64) -> GpsStatus {
        if !self.is_communicating(now_ms) {
            GpsStatus::Disconnected
        } else if self.fix.valid {
            GpsStatus::Fixed
        } else if self.fix.satellites > 0 {
            GpsStatus::Searching
        } else {
            GpsStatus::Off
        }
    }

    /// Total sentences applied since start
    pub fn sentence_count(&self) -> u64 {
        self.sentences
    }

    pub fn overflowed_lines(&self) -> u32 {
        self.parser.overflowed_lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA_FIX: &[u8] = b"$GNGGA,120000,2306.1234,S,04637.5000,W,1,09,0.8,760.0,M,,,,*00\n";
    const GGA_SEARCHING: &[u8] = b"$GNGGA,120000,,,,,0,04,,,,,,,*00\n";
    const GGA_OFF: &[u8] = b"$GNGGA,120000,,,,,0,00,,,,,,,*00\n";

    fn store() -> FixStore {
        FixStore::new(&TimingConfig::default())
    }

    #[test]
    fn test_disconnected_before_any_bytes() {
        let store = store();
        assert_eq!(store.status(0), GpsStatus::Disconnected);
        assert_eq!(store.status(10_000), GpsStatus::Disconnected);
    }

    #[test]
    fn test_status_priority_chain() {
        let mut store = store();

        store.ingest(GGA_OFF, 100);
        assert_eq!(store.status(100), GpsStatus::Off);

        store.ingest(GGA_SEARCHING, 200);
        assert_eq!(store.status(200), GpsStatus::Searching);

        store.ingest(GGA_FIX, 300);
        assert_eq!(store.status(300), GpsStatus::Fixed);

        // Liveness beats fix validity
        assert_eq!(store.status(300 + 1999), GpsStatus::Fixed);
        assert_eq!(store.status(300 + 2000), GpsStatus::Disconnected);
    }

    #[test]
    fn test_partial_bytes_keep_link_alive() {
        let mut store = store();
        store.ingest(GGA_FIX, 0);
        assert_eq!(store.ingest(b"$GNRMC,12", 1900), 0);
        assert!(store.is_communicating(3000));
        assert_eq!(store.latest().timestamp_ms, 0);
    }

    #[test]
    fn test_fix_is_stamped_and_copied() {
        let mut store = store();
        assert_eq!(store.ingest(GGA_FIX, 1234), 1);

        let fix = store.latest();
        assert_eq!(fix.timestamp_ms, 1234);
        assert!(fix.valid);
        assert!((fix.lat + (23.0 + 6.1234 / 60.0)).abs() < 1e-9);
        assert!(fix.lon < 0.0);
        assert_eq!(store.sentence_count(), 1);
    }
}
