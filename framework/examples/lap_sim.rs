//! Drives a synthetic kart around a circular track through the full pipeline
//!
//! A GGA (position) and RMC (time, speed, course) pair is generated at 10 Hz
//! for an 80 m radius circle and fed into the fix store, the same way the
//! receiver link would.
//! Lap speed varies so the best lap changes during the run, and a Racing
//! standing start is simulated at the end.
//!
//! Run with: cargo run -p lap-timing --example lap_sim

use std::f64::consts::TAU;

use lap_timing::{FixStore, TimingConfig, TimingEngine, NEW_BEST, RACE_START};

const CENTER_LAT: f64 = -23.5505;
const CENTER_LON: f64 = -46.6333;
const RADIUS_M: f64 = 80.0;
const STEP_MS: u64 = 100;

/// Simple pseudo-random noise generator (deterministic for reproducibility)
struct NoiseGen {
    state: u32,
}

impl NoiseGen {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Returns noise in range [-amplitude, +amplitude]
    fn next(&mut self, amplitude: f64) -> f64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345);
        let normalized = (self.state as f64 / u32::MAX as f64) * 2.0 - 1.0;
        normalized * amplitude
    }
}

/// Degrees to NMEA packed (d)ddmm.mmmm plus hemisphere
fn packed(value: f64, positive: char, negative: char, degree_digits: usize) -> (String, char) {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    (
        format!("{:0width$}{:07.4}", degrees as u32, minutes, width = degree_digits),
        hemisphere,
    )
}

/// One receiver epoch: GGA carries the position, RMC the motion
fn epoch(t_ms: u64, lat: f64, lon: f64, speed_kmh: f64, course: f64) -> String {
    let seconds = t_ms / 1000;
    let utc = format!(
        "{:02}{:02}{:02}.{:02}",
        15 + seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        (t_ms % 1000) / 10
    );
    let (lat_s, ns) = packed(lat, 'N', 'S', 2);
    let (lon_s, ew) = packed(lon, 'E', 'W', 3);
    format!(
        "$GPGGA,{utc},{lat_s},{ns},{lon_s},{ew},1,11,0.7,760.0,M,,,,*00\r\n\
         $GPRMC,{utc},A,{lat_s},{ns},{lon_s},{ew},{:.2},{:.1},170926,,,A*00\r\n",
        speed_kmh / 1.852,
        course
    )
}

struct Track {
    angle: f64,
    now_ms: u64,
    noise: NoiseGen,
}

impl Track {
    fn new(seed: u32) -> Self {
        Self {
            angle: 0.0,
            now_ms: 0,
            noise: NoiseGen::new(seed),
        }
    }

    /// Advance along the circle, returning the sentences for the new position
    fn step(&mut self, speed_kmh: f64) -> String {
        self.now_ms += STEP_MS;
        let distance = speed_kmh / 3.6 * (STEP_MS as f64 / 1000.0);
        self.angle = (self.angle + distance / RADIUS_M) % TAU;

        // Clockwise from north: position east = sin, north = cos
        let north = RADIUS_M * self.angle.cos() + self.noise.next(1.5);
        let east = RADIUS_M * self.angle.sin() + self.noise.next(1.5);
        let lat = CENTER_LAT + north / 111_320.0;
        let lon = CENTER_LON + east / (111_320.0 * CENTER_LAT.to_radians().cos());
        let course = (self.angle.to_degrees() + 90.0) % 360.0;

        epoch(self.now_ms, lat, lon, speed_kmh, course)
    }
}

fn main() {
    let config = TimingConfig::default();
    let mut store = FixStore::new(&config);
    let mut engine = TimingEngine::new(&config);
    let mut track = Track::new(7);

    println!("=== Lap timing simulation: {RADIUS_M} m radius circle ===\n");

    // Roll onto the line and mark it
    store.ingest(track.step(30.0).as_bytes(), track.now_ms);
    engine.define_finish_line(&store.latest(), track.now_ms);
    if let Some(line) = engine.finish_line() {
        println!(
            "Finish line at {:.6}, {:.6} heading {:.0}°\n",
            line.lat, line.lon, line.heading
        );
    }

    let lap_speeds = [42.0, 48.0, 45.0, 51.0, 39.0];
    let lap_length = TAU * RADIUS_M;

    for &speed in &lap_speeds {
        let steps = (lap_length / (speed / 3.6 * STEP_MS as f64 / 1000.0)).ceil() as u32 + 5;
        for _ in 0..steps {
            let sentence = track.step(speed);
            store.ingest(sentence.as_bytes(), track.now_ms);
            let evaluation = engine.evaluate(&store.latest(), track.now_ms);
            if let (Some(lap), Some(reading)) = (evaluation.lap, evaluation.reading) {
                println!(
                    "Lap {:>2}: {:>7.3} s  avg {:>5.1} km/h  {:>4.1} m from line{}",
                    lap.lap,
                    lap.duration_ms as f64 / 1000.0,
                    lap.avg_speed_kmh,
                    reading.distance_m,
                    if evaluation.has(NEW_BEST) { "  * best" } else { "" }
                );
            }
        }
    }

    // Standing start in Racing mode
    println!("\nRacing: standing start");
    engine.toggle_mode();
    for speed in [0.0, 2.0, 4.0, 8.0, 20.0] {
        let sentence = track.step(speed);
        store.ingest(sentence.as_bytes(), track.now_ms);
        let evaluation = engine.evaluate(&store.latest(), track.now_ms);
        if evaluation.has(RACE_START) {
            println!("  clock started at {speed:.0} km/h");
        }
    }

    let snapshot = engine.snapshot(track.now_ms);
    println!(
        "\nLaps: {}  best: {:?} ms  last: {:?} ms  status: {}",
        snapshot.lap_count,
        snapshot.best_lap_ms,
        snapshot.last_lap_ms,
        store.status(track.now_ms).as_str()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_places_fix_on_track() {
        let config = TimingConfig::default();
        let mut store = FixStore::new(&config);
        let mut track = Track::new(7);

        assert_eq!(store.ingest(track.step(30.0).as_bytes(), track.now_ms), 2);
        let fix = store.latest();
        let north_m = (fix.lat - CENTER_LAT) * 111_320.0;
        assert!((north_m - RADIUS_M).abs() < 3.0, "north offset {north_m}");
        assert_eq!(fix.satellites, 11);
    }

    #[test]
    fn test_laps_come_from_the_gate() {
        let config = TimingConfig::default();
        let mut store = FixStore::new(&config);
        let mut engine = TimingEngine::new(&config);
        let mut track = Track::new(7);

        store.ingest(track.step(30.0).as_bytes(), track.now_ms);
        assert!(engine.define_finish_line(&store.latest(), track.now_ms));

        let mut far_from_line = false;
        let mut distances = Vec::new();
        for _ in 0..1_000 {
            store.ingest(track.step(45.0).as_bytes(), track.now_ms);
            let evaluation = engine.evaluate(&store.latest(), track.now_ms);
            if let Some(reading) = evaluation.reading {
                far_from_line |= reading.distance_m > 100.0;
                if evaluation.lap.is_some() {
                    distances.push(reading.distance_m);
                }
            }
        }

        // 100 s at 12.5 m/s on a 503 m circle
        assert_eq!(engine.lap_count(), 2);
        assert!(far_from_line);
        assert!(distances.iter().all(|&d| d <= config.gate_radius_m));
    }
}
