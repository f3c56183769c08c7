//! GPS lap timing engine
//!
//! Turns a stream of receiver fixes into laps: a finish line marked at the
//! current position, a circular gate with a heading window around it, a lap
//! timer with best/last tracking, and a Qualifying / Racing mode machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  TimingEngine (define / evaluate / reset)│
//! ├────────────────────┬────────────────────┤
//! │  Geofence + edge   │  LapTimer          │
//! │  RaceModeMachine   │  (best, last, avg) │
//! ├────────────────────┴────────────────────┤
//! │  FixStore (nmea-gps parser, liveness)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The engine never reads a clock. Callers pass a monotonic `now_ms` to
//! every operation, which keeps tests and replays deterministic.
//!
//! ## Example Usage
//!
//! ```rust
//! use lap_timing::{FixStore, TimingConfig, TimingEngine};
//!
//! let config = TimingConfig::default();
//! let mut store = FixStore::new(&config);
//! let mut engine = TimingEngine::new(&config);
//!
//! store.ingest(b"$GPRMC,120000.00,A,2330.0000,S,04630.0000,W,20.0,90.0,150324,,,A*00\n", 0);
//! assert!(engine.define_finish_line(&store.latest(), 0));
//!
//! let evaluation = engine.evaluate(&store.latest(), 100);
//! assert!(evaluation.lap.is_none());
//! ```
//!
//! ## Modules
//!
//! - [`fix_store`] - Latest fix and GPS status
//! - [`geofence`] - Finish line, gate test and crossing edge detector
//! - [`lap_timer`] - Lap clock, best/last lap and average speed
//! - [`race_mode`] - Qualifying / Racing state machine
//! - [`engine`] - Aggregate tying the above together

pub mod config;
pub mod engine;
pub mod events;
pub mod fix_store;
pub mod geofence;
pub mod lap_timer;
pub mod race_mode;

// Re-export commonly used types
pub use config::TimingConfig;
pub use engine::{Evaluation, TimingEngine};
pub use events::{ImuSample, LapCompleted, SampleRecord, Snapshot, TimingSnapshot};
pub use fix_store::{FixStore, GpsStatus};
pub use geofence::FinishLine;
pub use lap_timer::{LapRecord, INVALID_LAP, NEW_BEST, NEW_LAP, RACE_START, TIMER_ARMED};
pub use nmea_gps::GpsFix;
pub use race_mode::RaceMode;
