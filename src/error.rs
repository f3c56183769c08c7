// Error types for kartbox

use std::io;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum KartboxError {
    // Errors for the GPS link
    #[snafu(display("Unable to open GPS input {path}"))]
    GpsInput { path: String, source: io::Error },
    #[snafu(display("Error writing receiver configuration"))]
    GpsConfigure { source: io::Error },

    // Errors for the session log
    #[snafu(display("Session storage error at {path}"))]
    Storage { path: String, source: io::Error },
    #[snafu(display("No session is being recorded"))]
    NoActiveSession,
    #[snafu(display("Session {name} not found"))]
    SessionNotFound { name: String },
    #[snafu(display("Malformed lap record in {file}: {line:?}"))]
    MalformedLap { file: String, line: String },
    #[snafu(display("Unable to start {name} thread"))]
    ThreadSpawn { name: String, source: io::Error },
    #[snafu(display("Log worker is not running"))]
    WorkerGone,

    // Config management errors
    #[snafu(display("Could not find application data directory for session storage"))]
    NoDataDir,
    #[snafu(display("Error reading config file {path}"))]
    ConfigIO { path: String, source: io::Error },
    #[snafu(display("Error parsing config file {path}"))]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },
    #[snafu(display("Invalid value {value:?} for {key}"))]
    InvalidSetting { key: String, value: String },

    // Process errors
    #[snafu(display("Could not set Ctrl-C handler"))]
    Signal { source: ctrlc::Error },
}

pub type Result<T, E = KartboxError> = std::result::Result<T, E>;
