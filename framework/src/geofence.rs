//! Finish-line gate geometry
//!
//! The finish line is a single point plus the course the vehicle had when the
//! operator marked it. A fix is inside the gate when it is within the gate
//! radius of that point and heading roughly the same way. Distance uses the
//! equirectangular approximation, plenty for a gate a few meters wide.

use nmea_gps::{transforms, GpsFix};

use crate::config::TimingConfig;

/// Marked finish line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishLine {
    /// Latitude (degrees)
    pub lat: f64,
    /// Longitude (degrees)
    pub lon: f64,
    /// Course when marked (degrees, 0 = North)
    pub heading: f32,
}

impl FinishLine {
    pub fn from_fix(fix: &GpsFix) -> Self {
        Self {
            lat: fix.lat,
            lon: fix.lon,
            heading: fix.course,
        }
    }

    /// Distance and heading deviation of `fix` relative to this line
    pub fn measure(&self, fix: &GpsFix) -> GateReading {
        GateReading {
            distance_m: transforms::planar_distance(self.lat, self.lon, fix.lat, fix.lon, fix.lat),
            heading_deviation_deg: heading_deviation(fix.course, self.heading),
        }
    }
}

/// One gate measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateReading {
    pub distance_m: f64,
    pub heading_deviation_deg: f32,
}

/// Gate dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    pub radius_m: f64,
    pub heading_tolerance_deg: f32,
}

impl Gate {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            radius_m: config.gate_radius_m,
            heading_tolerance_deg: config.heading_tolerance_deg,
        }
    }

    /// Both bounds are strict
    pub fn contains(&self, reading: &GateReading) -> bool {
        reading.distance_m < self.radius_m
            && reading.heading_deviation_deg < self.heading_tolerance_deg
    }
}

/// Absolute difference between two courses, folded into 0..=180
pub fn heading_deviation(a: f32, b: f32) -> f32 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Edge detector for "inside the gate"
///
/// Only the outside → inside transition fires; staying inside never retriggers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossingDetector {
    inside: bool,
}

impl CrossingDetector {
    /// Record the current state, returns true on entry
    pub fn update(&mut self, inside: bool) -> bool {
        let entered = inside && !self.inside;
        self.inside = inside;
        entered
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }

    pub fn clear(&mut self) {
        self.inside = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix_at(lat: f64, lon: f64, course: f32) -> GpsFix {
        GpsFix {
            lat,
            lon,
            course,
            valid: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_heading_deviation_wraps() {
        assert_eq!(heading_deviation(10.0, 350.0), 20.0);
        assert_eq!(heading_deviation(350.0, 10.0), 20.0);
        assert_eq!(heading_deviation(0.0, 180.0), 180.0);
        assert_eq!(heading_deviation(90.0, 90.0), 0.0);
        assert_eq!(heading_deviation(359.0, 0.0), 1.0);
    }

    #[test]
    fn test_measure_distance() {
        let line = FinishLine::from_fix(&fix_at(0.0, 0.0, 0.0));
        // ~5 m north of the line
        let reading = line.measure(&fix_at(5.0 / 111320.0, 0.0, 0.0));
        assert!((reading.distance_m - 5.0).abs() < 1e-6);
        assert_eq!(reading.heading_deviation_deg, 0.0);
    }

    #[test]
    fn test_gate_bounds_are_strict() {
        let gate = Gate::new(&TimingConfig::default());
        let inside = GateReading {
            distance_m: 11.9,
            heading_deviation_deg: 44.9,
        };
        let on_radius = GateReading {
            distance_m: 12.0,
            ..inside
        };
        let on_heading = GateReading {
            heading_deviation_deg: 45.0,
            ..inside
        };
        assert!(gate.contains(&inside));
        assert!(!gate.contains(&on_radius));
        assert!(!gate.contains(&on_heading));
    }

    #[test]
    fn test_wrong_direction_is_outside() {
        let gate = Gate::new(&TimingConfig::default());
        let line = FinishLine::from_fix(&fix_at(-23.5, -46.6, 90.0));
        let reading = line.measure(&fix_at(-23.5, -46.6, 270.0));
        assert!(!gate.contains(&reading));
    }

    #[test]
    fn test_crossing_detector_edges() {
        let mut detector = CrossingDetector::default();
        assert!(!detector.update(false));
        assert!(detector.update(true));
        assert!(!detector.update(true));
        assert!(!detector.update(false));
        assert!(detector.update(true));

        detector.clear();
        assert!(!detector.is_inside());
        assert!(detector.update(true));
    }
}
