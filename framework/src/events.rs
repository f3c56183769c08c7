//! Payloads handed to the log writer and the display
//!
//! Everything here is a plain copy of engine state. Collaborators may keep or
//! move them to another thread without touching the engine.

use nmea_gps::GpsFix;
use serde::Serialize;

use crate::fix_store::GpsStatus;
use crate::lap_timer::LapRecord;
use crate::race_mode::RaceMode;

/// Inertial reading slot in sample records. No IMU is fitted, always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImuSample {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
}

/// Emitted on every accepted crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapCompleted {
    pub lap: u16,
    pub duration_ms: u32,
    pub avg_speed_kmh: f32,
    pub fix: GpsFix,
    pub mode: RaceMode,
}

impl LapCompleted {
    pub fn record(&self) -> LapRecord {
        LapRecord {
            lap: self.lap,
            duration_ms: self.duration_ms,
            avg_speed_kmh: self.avg_speed_kmh,
        }
    }
}

/// One row of the continuous sample log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Poll time of the tick that logged the row. The fix may be older.
    pub timestamp_ms: u64,
    pub fix: GpsFix,
    pub imu: ImuSample,
    pub mode: RaceMode,
    pub lap: u16,
}

/// Timing part of the display snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSnapshot {
    pub elapsed_ms: u32,
    pub delta_ms: i32,
    pub lap_count: u16,
    pub last_lap_ms: Option<u32>,
    pub best_lap_ms: Option<u32>,
    pub mode: RaceMode,
    pub awaiting_start: bool,
    pub line_defined: bool,
}

/// Composite snapshot rendered by the display every refresh interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub timing: TimingSnapshot,
    pub speed_kmh: f32,
    pub status: GpsStatus,
    pub satellites: u8,
    pub session_id: u16,
    pub recording: bool,
    /// Reset button hold progress (0-100) while pressed
    pub reset_progress: Option<u8>,
}
