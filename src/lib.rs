//! Kartbox GPS lap timer
//!
//! Application layer around the `lap-timing` engine: the polling loop
//! orchestrator, the CSV session log and its worker thread, the driver
//! display, operator input and configuration.
//!
//! ## Architecture
//!
//! ```text
//!  GpsLink ──bytes──▶ SessionOrchestrator ──snapshots──▶ Display
//!  CommandPanel ─events─▶   │    ▲
//!                    commands  reports
//!                           ▼    │
//!                        LogWorker ──▶ CsvSessionLog
//! ```

pub mod buttons;
pub mod config;
pub mod display;
pub mod error;
pub mod gps_link;
pub mod log_worker;
pub mod session_log;
pub mod system;

pub use buttons::{ButtonEvent, CommandPanel};
pub use config::SystemConfig;
pub use display::{Display, Notice, TerminalDisplay};
pub use error::{KartboxError, Result};
pub use log_worker::{LogCommand, LogWorker, WorkerReport};
pub use session_log::{CsvSessionLog, SessionArchive, SessionLog};
pub use system::{OrchestratorConfig, SessionOrchestrator, SessionState};
