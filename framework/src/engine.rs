//! Timing engine aggregate
//!
//! Single owner of finish line, crossing state, lap timer and race mode. All
//! operations take the current monotonic time explicitly; nothing here reads
//! a clock, spawns work or keeps a callback.

use log::{debug, info};
use nmea_gps::GpsFix;

use crate::config::TimingConfig;
use crate::events::{LapCompleted, TimingSnapshot};
use crate::geofence::{CrossingDetector, FinishLine, Gate, GateReading};
use crate::lap_timer::{
    CrossingOutcome, LapRecord, LapTimer, FLAG_NONE, INVALID_LAP, NEW_BEST, NEW_LAP, RACE_START,
    TIMER_ARMED,
};
use crate::race_mode::{RaceMode, RaceModeMachine};

/// Result of evaluating one fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Bitfield of lap_timer flags (NEW_LAP, NEW_BEST, INVALID_LAP, RACE_START, TIMER_ARMED)
    pub flags: u8,
    /// Gate measurement, when the gate was evaluated
    pub reading: Option<GateReading>,
    /// Completed lap event, when a crossing was accepted
    pub lap: Option<LapCompleted>,
}

impl Evaluation {
    fn skipped() -> Self {
        Self {
            flags: FLAG_NONE,
            reading: None,
            lap: None,
        }
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

pub struct TimingEngine {
    finish_line: Option<FinishLine>,
    gate: Gate,
    crossing: CrossingDetector,
    timer: LapTimer,
    race: RaceModeMachine,
}

impl TimingEngine {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            finish_line: None,
            gate: Gate::new(config),
            crossing: CrossingDetector::default(),
            timer: LapTimer::new(config),
            race: RaceModeMachine::new(config),
        }
    }

    /// Mark the finish line at the current fix
    ///
    /// Fails without side effects when the fix is invalid. On success the lap
    /// clock is armed at `now_ms` but no lap is produced.
    pub fn define_finish_line(&mut self, fix: &GpsFix, now_ms: u64) -> bool {
        if !fix.valid {
            return false;
        }

        let line = FinishLine::from_fix(fix);
        info!(
            "Finish line set at {:.6}, {:.6} heading {:.0}°",
            line.lat, line.lon, line.heading
        );
        self.finish_line = Some(line);
        self.crossing.clear();
        self.timer.arm(now_ms);
        true
    }

    /// Run gate detection and lap timing for one fix
    pub fn evaluate(&mut self, fix: &GpsFix, now_ms: u64) -> Evaluation {
        if !fix.valid {
            return Evaluation::skipped();
        }
        let Some(line) = self.finish_line else {
            return Evaluation::skipped();
        };

        // Racing: hold everything until the kart moves, then start the clock
        if self.race.is_awaiting_movement() {
            if self.race.observe_speed(fix.speed_kmh) {
                info!("Race start detected at {:.1} km/h", fix.speed_kmh);
                self.timer.arm(now_ms);
                return Evaluation {
                    flags: RACE_START,
                    ..Evaluation::skipped()
                };
            }
            return Evaluation::skipped();
        }

        self.timer.sample_speed(fix.speed_kmh);

        let reading = line.measure(fix);
        let entered = self.crossing.update(self.gate.contains(&reading));

        let mut evaluation = Evaluation {
            reading: Some(reading),
            ..Evaluation::skipped()
        };
        if !entered {
            return evaluation;
        }

        match self.timer.on_crossing(now_ms, fix.speed_kmh) {
            CrossingOutcome::Armed => {
                debug!("Gate entered with timer idle, lap clock started");
                evaluation.flags |= TIMER_ARMED;
            }
            CrossingOutcome::Rejected { elapsed_ms } => {
                debug!(
                    "Crossing rejected: {} ms since last crossing ({:.1} m from line)",
                    elapsed_ms, reading.distance_m
                );
                evaluation.flags |= INVALID_LAP;
            }
            CrossingOutcome::Completed { record, new_best } => {
                info!(
                    "Lap {} completed: {} ms, avg {:.1} km/h{}",
                    record.lap,
                    record.duration_ms,
                    record.avg_speed_kmh,
                    if new_best { " (best)" } else { "" }
                );
                evaluation.flags |= NEW_LAP;
                if new_best {
                    evaluation.flags |= NEW_BEST;
                }
                evaluation.lap = Some(LapCompleted {
                    lap: record.lap,
                    duration_ms: record.duration_ms,
                    avg_speed_kmh: record.avg_speed_kmh,
                    fix: *fix,
                    mode: self.race.mode(),
                });
            }
        }

        evaluation
    }

    /// Operator mode toggle; entering Racing freezes the lap clock until movement
    pub fn toggle_mode(&mut self) -> RaceMode {
        let mode = self.race.toggle();
        if self.race.is_awaiting_movement() {
            self.timer.disarm();
        }
        info!("Mode changed to {}", mode.as_str());
        mode
    }

    /// Back to a blank Qualifying session; safe to call any time
    pub fn reset(&mut self) {
        self.timer.reset();
        self.finish_line = None;
        self.crossing.clear();
        self.race.reset();
    }

    pub fn current_elapsed_ms(&self, now_ms: u64) -> u32 {
        self.timer.current_elapsed_ms(now_ms)
    }

    pub fn live_delta_ms(&self, now_ms: u64) -> i32 {
        self.timer.live_delta_ms(now_ms)
    }

    pub fn lap_count(&self) -> u16 {
        self.timer.lap_count()
    }

    pub fn last_lap_ms(&self) -> Option<u32> {
        self.timer.last_lap_ms()
    }

    pub fn best_lap_ms(&self) -> Option<u32> {
        self.timer.best_lap_ms()
    }

    pub fn laps(&self) -> impl DoubleEndedIterator<Item = &LapRecord> {
        self.timer.laps()
    }

    pub fn mode(&self) -> RaceMode {
        self.race.mode()
    }

    pub fn is_awaiting_movement(&self) -> bool {
        self.race.is_awaiting_movement()
    }

    pub fn finish_line(&self) -> Option<&FinishLine> {
        self.finish_line.as_ref()
    }

    pub fn is_inside_gate(&self) -> bool {
        self.crossing.is_inside()
    }

    pub fn snapshot(&self, now_ms: u64) -> TimingSnapshot {
        TimingSnapshot {
            elapsed_ms: self.current_elapsed_ms(now_ms),
            delta_ms: self.live_delta_ms(now_ms),
            lap_count: self.lap_count(),
            last_lap_ms: self.last_lap_ms(),
            best_lap_ms: self.best_lap_ms(),
            mode: self.mode(),
            awaiting_start: self.is_awaiting_movement(),
            line_defined: self.finish_line.is_some(),
        }
    }
}
