//! Qualifying / Racing state machine
//!
//! Qualifying times from the moment the finish line is marked. Racing holds
//! the clock after the toggle and starts it on the first fix above the start
//! speed, so a standing start is timed from the moment the kart moves.
//!
//! ```text
//!   Qualifying ──toggle──▶ AwaitingMovement ──speed > start──▶ Timing
//!        ▲                        │                              │
//!        └─────────toggle─────────┴─────────────toggle───────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;

/// Operator-visible mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RaceMode {
    #[default]
    Qualifying,
    Racing,
}

impl RaceMode {
    /// Get mode as string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualifying => "QUALIFYING",
            Self::Racing => "RACE",
        }
    }

    /// Numeric code used in sample logs
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Qualifying => 0,
            Self::Racing => 1,
        }
    }
}

/// Full state including the Racing sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    Qualifying,
    AwaitingMovement,
    Timing,
}

pub struct RaceModeMachine {
    phase: RacePhase,
    start_speed_kmh: f32,
}

impl RaceModeMachine {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            phase: RacePhase::Qualifying,
            start_speed_kmh: config.race_start_speed_kmh,
        }
    }

    /// Flip between Qualifying and Racing; returns the new mode
    pub fn toggle(&mut self) -> RaceMode {
        self.phase = match self.phase {
            RacePhase::Qualifying => RacePhase::AwaitingMovement,
            RacePhase::AwaitingMovement | RacePhase::Timing => RacePhase::Qualifying,
        };
        self.mode()
    }

    /// Feed a fix speed. Returns true exactly when this sample starts the race.
    pub fn observe_speed(&mut self, speed_kmh: f32) -> bool {
        if self.phase == RacePhase::AwaitingMovement && speed_kmh > self.start_speed_kmh {
            self.phase = RacePhase::Timing;
            return true;
        }
        false
    }

    pub fn is_awaiting_movement(&self) -> bool {
        self.phase == RacePhase::AwaitingMovement
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn mode(&self) -> RaceMode {
        match self.phase {
            RacePhase::Qualifying => RaceMode::Qualifying,
            RacePhase::AwaitingMovement | RacePhase::Timing => RaceMode::Racing,
        }
    }

    pub fn reset(&mut self) {
        self.phase = RacePhase::Qualifying;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> RaceModeMachine {
        RaceModeMachine::new(&TimingConfig::default())
    }

    #[test]
    fn test_starts_in_qualifying() {
        let machine = machine();
        assert_eq!(machine.mode(), RaceMode::Qualifying);
        assert!(!machine.is_awaiting_movement());
    }

    #[test]
    fn test_toggle_cycle() {
        let mut machine = machine();
        assert_eq!(machine.toggle(), RaceMode::Racing);
        assert_eq!(machine.phase(), RacePhase::AwaitingMovement);
        assert_eq!(machine.toggle(), RaceMode::Qualifying);

        machine.toggle();
        machine.observe_speed(20.0);
        assert_eq!(machine.phase(), RacePhase::Timing);
        assert_eq!(machine.toggle(), RaceMode::Qualifying);
    }

    #[test]
    fn test_start_threshold_is_strict() {
        let mut machine = machine();
        machine.toggle();
        assert!(!machine.observe_speed(5.0));
        assert!(machine.is_awaiting_movement());
        assert!(machine.observe_speed(5.1));
        assert!(!machine.observe_speed(30.0));
    }

    #[test]
    fn test_speed_ignored_in_qualifying() {
        let mut machine = machine();
        assert!(!machine.observe_speed(100.0));
        assert_eq!(machine.phase(), RacePhase::Qualifying);
    }

    #[test]
    fn test_reset_returns_to_qualifying() {
        let mut machine = machine();
        machine.toggle();
        machine.reset();
        assert_eq!(machine.mode(), RaceMode::Qualifying);
        assert_eq!(RaceMode::Racing.as_u8(), 1);
        assert_eq!(RaceMode::Qualifying.as_str(), "QUALIFYING");
    }
}
