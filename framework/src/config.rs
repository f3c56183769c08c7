//! Timing thresholds
//!
//! Reference values come from the kart device firmware. The two speed
//! thresholds have no derivation beyond field use and stay configurable.

use serde::{Deserialize, Serialize};

/// Gate radius around the finish line point (meters)
pub const DEFAULT_GATE_RADIUS_M: f64 = 12.0;

/// Maximum course deviation from the finish line heading (degrees)
pub const DEFAULT_HEADING_TOLERANCE_DEG: f32 = 45.0;

/// Crossings closer than this to the previous one are GPS jitter (milliseconds)
pub const DEFAULT_MIN_LAP_TIME_MS: u32 = 20_000;

/// Samples at or below this speed are left out of the lap average (km/h)
pub const DEFAULT_AVG_SPEED_MIN_KMH: f32 = 1.0;

/// Speed that counts as the race start in Racing mode (km/h)
pub const DEFAULT_RACE_START_SPEED_KMH: f32 = 5.0;

/// Completed laps retained in memory
pub const DEFAULT_MAX_LAPS: usize = 100;

/// No receiver bytes for this long means disconnected (milliseconds)
pub const DEFAULT_LINK_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub gate_radius_m: f64,
    pub heading_tolerance_deg: f32,
    pub min_lap_time_ms: u32,
    pub avg_speed_min_kmh: f32,
    pub race_start_speed_kmh: f32,
    pub max_laps: usize,
    pub link_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            gate_radius_m: DEFAULT_GATE_RADIUS_M,
            heading_tolerance_deg: DEFAULT_HEADING_TOLERANCE_DEG,
            min_lap_time_ms: DEFAULT_MIN_LAP_TIME_MS,
            avg_speed_min_kmh: DEFAULT_AVG_SPEED_MIN_KMH,
            race_start_speed_kmh: DEFAULT_RACE_START_SPEED_KMH,
            max_laps: DEFAULT_MAX_LAPS,
            link_timeout_ms: DEFAULT_LINK_TIMEOUT_MS,
        }
    }
}
