/// Configuration management for the kartbox timer
///
/// Layers, lowest priority first: built-in defaults, a JSON file, `KARTBOX_*`
/// environment variables, then command-line flags (applied by `main`).
use std::{
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use lap_timing::TimingConfig;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{ConfigIOSnafu, ConfigParseSnafu, KartboxError, Result};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR: &str = "kartbox";
const ENV_PREFIX: &str = "KARTBOX_";

/// GPS receiver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Navigation rate requested from the receiver at start-up
    pub update_rate_hz: u8,
    /// Bytes read from the link per call
    pub read_chunk: usize,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: 10,
            read_chunk: 512,
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_ms: u64,
    /// Emit snapshots as JSON lines instead of the status line
    pub json: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 100,
            json: false,
        }
    }
}

/// Master system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub timing: TimingConfig,
    pub gps: GpsConfig,
    pub display: DisplayConfig,
    /// Polling loop cadence
    pub poll_interval_ms: u64,
    /// Reset hold time that ends a session
    pub long_press_ms: u64,
    /// Session CSV directory; platform data dir when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            gps: GpsConfig::default(),
            display: DisplayConfig::default(),
            poll_interval_ms: 10,
            long_press_ms: 2000,
            storage_dir: None,
        }
    }
}

impl SystemConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let file = File::open(path).context(ConfigIOSnafu {
            path: display.clone(),
        })?;
        serde_json::from_reader(file).context(ConfigParseSnafu { path: display })
    }

    /// Explicit file if given, else `<config dir>/kartbox/config.json` when it
    /// exists, else defaults. Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Apply `KARTBOX_*` overrides
    ///
    /// ```bash
    /// export KARTBOX_STORAGE_DIR=/mnt/sd
    /// export KARTBOX_GATE_RADIUS_M=10
    /// export KARTBOX_MIN_LAP_MS=30000
    /// ```
    ///
    /// Unknown keys are ignored; unparsable values are an error.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "STORAGE_DIR" => self.storage_dir = Some(PathBuf::from(&value)),
                "GPS_RATE_HZ" => self.gps.update_rate_hz = parse(&key, &value)?,
                "REFRESH_MS" => self.display.refresh_ms = parse(&key, &value)?,
                "POLL_MS" => self.poll_interval_ms = parse(&key, &value)?,
                "LONG_PRESS_MS" => self.long_press_ms = parse(&key, &value)?,
                "GATE_RADIUS_M" => self.timing.gate_radius_m = parse(&key, &value)?,
                "HEADING_TOLERANCE_DEG" => {
                    self.timing.heading_tolerance_deg = parse(&key, &value)?
                }
                "MIN_LAP_MS" => self.timing.min_lap_time_ms = parse(&key, &value)?,
                "RACE_START_KMH" => self.timing.race_start_speed_kmh = parse(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Directory for session files, created on first use by the session log
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(KartboxError::NoDataDir),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KartboxError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
}
