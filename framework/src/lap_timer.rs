//! Lap timer
//!
//! Owns lap count, last/best lap, the per-lap average speed accumulator and
//! the instant of the last accepted crossing. The timer does not look at
//! positions: the engine tells it when the gate was entered.
//!
//! ## Usage
//!
//! ```rust
//! use lap_timing::lap_timer::{CrossingOutcome, LapTimer};
//! use lap_timing::TimingConfig;
//!
//! let mut timer = LapTimer::new(&TimingConfig::default());
//! timer.arm(0);
//! timer.sample_speed(60.0);
//!
//! match timer.on_crossing(62_000, 58.0) {
//!     CrossingOutcome::Completed { record, .. } => assert_eq!(record.duration_ms, 62_000),
//!     other => panic!("unexpected {other:?}"),
//! }
//! assert_eq!(timer.best_lap_ms(), Some(62_000));
//! ```

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::TimingConfig;

// Evaluation flag bits
/// No flags set
pub const FLAG_NONE: u8 = 0;
/// A lap was completed this evaluation
pub const NEW_LAP: u8 = 1 << 0;
/// The completed lap is the new best
pub const NEW_BEST: u8 = 1 << 1;
/// Gate entered too soon after the last crossing
pub const INVALID_LAP: u8 = 1 << 2;
/// Racing mode saw movement and started the clock
pub const RACE_START: u8 = 1 << 3;
/// Gate entered with the timer unarmed; clock started, no lap
pub const TIMER_ARMED: u8 = 1 << 4;

/// One completed lap
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LapRecord {
    pub lap: u16,
    pub duration_ms: u32,
    pub avg_speed_kmh: f32,
}

/// Result of a gate entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossingOutcome {
    /// Timer was unarmed; it now runs from this instant
    Armed,
    /// Too close to the previous crossing, nothing recorded
    Rejected { elapsed_ms: u32 },
    /// Lap accepted
    Completed { record: LapRecord, new_best: bool },
}

/// Running speed average since the last crossing
#[derive(Debug, Default, Clone, Copy)]
struct SpeedAverager {
    sum: f32,
    samples: u32,
}

impl SpeedAverager {
    fn add(&mut self, speed_kmh: f32) {
        self.sum += speed_kmh;
        self.samples += 1;
    }

    fn average(&self) -> Option<f32> {
        (self.samples > 0).then(|| self.sum / self.samples as f32)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct LapTimer {
    lap_count: u16,
    last_lap_ms: Option<u32>,
    best_lap_ms: Option<u32>,
    speed: SpeedAverager,
    /// Instant of the last accepted crossing; `None` = unarmed
    last_crossing_ms: Option<u64>,
    history: VecDeque<LapRecord>,
    min_lap_time_ms: u32,
    avg_speed_min_kmh: f32,
    max_laps: usize,
}

impl LapTimer {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            lap_count: 0,
            last_lap_ms: None,
            best_lap_ms: None,
            speed: SpeedAverager::default(),
            last_crossing_ms: None,
            history: VecDeque::with_capacity(config.max_laps),
            min_lap_time_ms: config.min_lap_time_ms,
            avg_speed_min_kmh: config.avg_speed_min_kmh,
            max_laps: config.max_laps,
        }
    }

    /// Start the lap clock at `now_ms` without producing a lap
    pub fn arm(&mut self, now_ms: u64) {
        self.last_crossing_ms = Some(now_ms);
    }

    /// Stop the lap clock; elapsed reads 0 until armed again
    pub fn disarm(&mut self) {
        self.last_crossing_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.last_crossing_ms.is_some()
    }

    /// Add a speed sample to the lap average; near-stationary samples are skipped
    pub fn sample_speed(&mut self, speed_kmh: f32) {
        if speed_kmh > self.avg_speed_min_kmh {
            self.speed.add(speed_kmh);
        }
    }

    /// Handle a gate entry at `now_ms`
    ///
    /// `current_speed_kmh` stands in for the lap average when no sample was
    /// accumulated.
    pub fn on_crossing(&mut self, now_ms: u64, current_speed_kmh: f32) -> CrossingOutcome {
        let Some(last_crossing) = self.last_crossing_ms else {
            self.arm(now_ms);
            return CrossingOutcome::Armed;
        };

        let elapsed_ms = elapsed_between(last_crossing, now_ms);
        if elapsed_ms <= self.min_lap_time_ms {
            return CrossingOutcome::Rejected { elapsed_ms };
        }

        self.lap_count = self.lap_count.saturating_add(1);
        self.last_lap_ms = Some(elapsed_ms);

        let new_best = self.best_lap_ms.is_none_or(|best| elapsed_ms < best);
        if new_best {
            self.best_lap_ms = Some(elapsed_ms);
        }

        let record = LapRecord {
            lap: self.lap_count,
            duration_ms: elapsed_ms,
            avg_speed_kmh: self.speed.average().unwrap_or(current_speed_kmh),
        };
        if self.history.len() == self.max_laps {
            self.history.pop_front();
        }
        if self.max_laps > 0 {
            self.history.push_back(record);
        }

        self.speed.clear();
        self.last_crossing_ms = Some(now_ms);

        CrossingOutcome::Completed { record, new_best }
    }

    /// Time since the last crossing, 0 when unarmed
    pub fn current_elapsed_ms(&self, now_ms: u64) -> u32 {
        self.last_crossing_ms
            .map_or(0, |last| elapsed_between(last, now_ms))
    }

    /// Elapsed minus best (negative = ahead), 0 without a best lap or when unarmed
    pub fn live_delta_ms(&self, now_ms: u64) -> i32 {
        match (self.best_lap_ms, self.last_crossing_ms) {
            (Some(best), Some(_)) => {
                let delta = i64::from(self.current_elapsed_ms(now_ms)) - i64::from(best);
                delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
            }
            _ => 0,
        }
    }

    pub fn lap_count(&self) -> u16 {
        self.lap_count
    }

    pub fn last_lap_ms(&self) -> Option<u32> {
        self.last_lap_ms
    }

    pub fn best_lap_ms(&self) -> Option<u32> {
        self.best_lap_ms
    }

    /// Retained laps, oldest first; `.rev()` for newest first
    pub fn laps(&self) -> impl DoubleEndedIterator<Item = &LapRecord> {
        self.history.iter()
    }

    /// Zero everything and disarm
    pub fn reset(&mut self) {
        self.lap_count = 0;
        self.last_lap_ms = None;
        self.best_lap_ms = None;
        self.speed.clear();
        self.last_crossing_ms = None;
        self.history.clear();
    }
}

fn elapsed_between(from_ms: u64, to_ms: u64) -> u32 {
    u32::try_from(to_ms.saturating_sub(from_ms)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timer() -> LapTimer {
        LapTimer::new(&TimingConfig::default())
    }

    #[test]
    fn test_lap_timer_initial_state() {
        let timer = timer();
        assert!(!timer.is_armed());
        assert_eq!(timer.lap_count(), 0);
        assert_eq!(timer.best_lap_ms(), None);
        assert_eq!(timer.current_elapsed_ms(50_000), 0);
        assert_eq!(timer.live_delta_ms(50_000), 0);
    }

    #[test]
    fn test_unarmed_crossing_arms() {
        let mut timer = timer();
        assert_eq!(timer.on_crossing(5_000, 40.0), CrossingOutcome::Armed);
        assert_eq!(timer.lap_count(), 0);
        assert_eq!(timer.current_elapsed_ms(7_000), 2_000);
    }

    #[test]
    fn test_min_lap_time_rejects() {
        let mut timer = timer();
        timer.arm(0);
        assert_eq!(
            timer.on_crossing(20_000, 40.0),
            CrossingOutcome::Rejected { elapsed_ms: 20_000 }
        );
        assert_eq!(timer.lap_count(), 0);
        assert_eq!(timer.last_lap_ms(), None);
        // Clock keeps running from the original crossing
        assert_eq!(timer.current_elapsed_ms(25_000), 25_000);
    }

    #[test]
    fn test_average_speed_skips_slow_samples() {
        let mut timer = timer();
        timer.arm(0);
        for speed in [0.5, 40.0, 1.0, 60.0] {
            timer.sample_speed(speed);
        }
        match timer.on_crossing(30_000, 10.0) {
            CrossingOutcome::Completed { record, new_best } => {
                assert!(new_best);
                assert_eq!(record.lap, 1);
                assert!((record.avg_speed_kmh - 50.0).abs() < 1e-4);
            }
            other => panic!("expected lap, got {other:?}"),
        }
    }

    #[test]
    fn test_average_falls_back_to_current_speed() {
        let mut timer = timer();
        timer.arm(0);
        timer.sample_speed(0.2);
        match timer.on_crossing(30_000, 33.0) {
            CrossingOutcome::Completed { record, .. } => assert_eq!(record.avg_speed_kmh, 33.0),
            other => panic!("expected lap, got {other:?}"),
        }
    }

    #[test]
    fn test_best_lap_tracking() {
        let mut timer = timer();
        timer.arm(0);
        timer.on_crossing(60_000, 50.0);
        timer.on_crossing(115_000, 50.0);
        timer.on_crossing(175_000, 50.0);

        assert_eq!(timer.lap_count(), 3);
        assert_eq!(timer.last_lap_ms(), Some(60_000));
        assert_eq!(timer.best_lap_ms(), Some(55_000));
    }

    #[test]
    fn test_live_delta() {
        let mut timer = timer();
        timer.arm(0);
        timer.on_crossing(60_000, 50.0);

        assert_eq!(timer.live_delta_ms(60_000 + 45_000), -15_000);
        assert_eq!(timer.live_delta_ms(60_000 + 61_500), 1_500);

        timer.disarm();
        assert_eq!(timer.live_delta_ms(200_000), 0);
    }

    #[test]
    fn test_history_capped() {
        let mut timer = LapTimer::new(&TimingConfig {
            max_laps: 2,
            ..Default::default()
        });
        timer.arm(0);
        for lap in 1..=3u64 {
            timer.on_crossing(lap * 30_000, 40.0);
        }

        let laps: Vec<u16> = timer.laps().map(|l| l.lap).collect();
        assert_eq!(laps, vec![2, 3]);
        assert_eq!(timer.lap_count(), 3);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut timer = timer();
        timer.arm(0);
        timer.on_crossing(30_000, 40.0);
        timer.reset();
        timer.reset();

        assert!(!timer.is_armed());
        assert_eq!(timer.lap_count(), 0);
        assert_eq!(timer.best_lap_ms(), None);
        assert_eq!(timer.laps().count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_best_never_increases(gaps in proptest::collection::vec(1_000u64..120_000, 1..40)) {
            let mut timer = timer();
            timer.arm(0);
            let mut now = 0;
            let mut previous_best: Option<u32> = None;

            for gap in gaps {
                now += gap;
                timer.on_crossing(now, 40.0);
                let best = timer.best_lap_ms();
                if let (Some(before), Some(after)) = (previous_best, best) {
                    prop_assert!(after <= before);
                }
                if previous_best.is_some() {
                    prop_assert!(best.is_some());
                }
                previous_best = best;
            }
        }

        #[test]
        fn prop_delta_matches_elapsed_minus_best(lap in 20_001u64..200_000, extra in 0u64..300_000) {
            let mut timer = timer();
            timer.arm(0);
            timer.on_crossing(lap, 40.0);
            let now = lap + extra;
            let expected = i64::from(timer.current_elapsed_ms(now)) - lap as i64;
            prop_assert_eq!(i64::from(timer.live_delta_ms(now)), expected);
        }
    }
}
