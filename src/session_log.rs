//! Session log: CSV files on a storage directory
//!
//! Directory layout:
//!
//! ```text
//! last_id.txt                 session counter
//! data_<name>.csv             Timestamp_ms,Lat,Lon,Speed,Mode,Lap
//! laps_<name>.csv             lap,S.mmm,avg_kmh   (no header)
//! ```
//!
//! `<name>` is `20YYMMDD_HHMM` from the fix that started the session, or
//! `RUN_NNN` when the fix had no valid time.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use lap_timing::{GpsFix, LapCompleted, LapRecord, SampleRecord};
use log::{info, warn};
use snafu::ResultExt;

use crate::error::{KartboxError, Result, StorageSnafu};

const LAST_ID_FILE: &str = "last_id.txt";
const DATA_PREFIX: &str = "data_";
const LAPS_PREFIX: &str = "laps_";
const CSV_EXT: &str = ".csv";
const DATA_HEADER: &str = "Timestamp_ms,Lat,Lon,Speed,Mode,Lap";

/// Persistent log collaborator
///
/// Implementations run on the log worker thread; nothing here is called from
/// the polling loop directly.
pub trait SessionLog: Send {
    /// Id of the current (or last) session
    fn session_id(&self) -> u16;

    /// Open a new session, closing any open one. Returns the new id.
    fn start_session(&mut self, fix: &GpsFix) -> Result<u16>;

    /// Close the open session; no-op without one
    fn stop_session(&mut self) -> Result<()>;

    fn log_sample(&mut self, sample: &SampleRecord) -> Result<()>;

    fn log_lap(&mut self, lap: &LapCompleted) -> Result<()>;
}

/// Session file name stem
pub fn session_name(fix: &GpsFix, session_id: u16) -> String {
    if fix.valid {
        format!(
            "20{:02}{:02}{:02}_{:02}{:02}",
            fix.year, fix.month, fix.day, fix.hour, fix.minute
        )
    } else {
        format!("RUN_{session_id:03}")
    }
}

/// `S.mmm` lap duration as stored in lap files
pub fn format_lap_seconds(duration_ms: u32) -> String {
    format!("{}.{:03}", duration_ms / 1000, duration_ms % 1000)
}

fn storage_err(path: &Path) -> StorageSnafu<String> {
    StorageSnafu {
        path: path.display().to_string(),
    }
}

struct OpenSession {
    name: String,
    data_path: PathBuf,
    data: BufWriter<File>,
}

pub struct CsvSessionLog {
    dir: PathBuf,
    session_id: u16,
    open: Option<OpenSession>,
}

impl CsvSessionLog {
    /// Open (and create) the storage directory and restore the session counter
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).context(storage_err(&dir))?;

        let id_path = dir.join(LAST_ID_FILE);
        let session_id = match fs::read_to_string(&id_path) {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unreadable session counter in {}", id_path.display());
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e).context(storage_err(&id_path)),
        };

        Ok(Self {
            dir,
            session_id,
            open: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the open session
    pub fn current_name(&self) -> Option<&str> {
        self.open.as_ref().map(|s| s.name.as_str())
    }

    fn path(&self, prefix: &str, name: &str) -> PathBuf {
        self.dir.join(format!("{prefix}{name}{CSV_EXT}"))
    }
}

impl SessionLog for CsvSessionLog {
    fn session_id(&self) -> u16 {
        self.session_id
    }

    fn start_session(&mut self, fix: &GpsFix) -> Result<u16> {
        self.stop_session()?;

        self.session_id = self.session_id.wrapping_add(1);
        let id_path = self.dir.join(LAST_ID_FILE);
        fs::write(&id_path, self.session_id.to_string()).context(storage_err(&id_path))?;

        let name = session_name(fix, self.session_id);
        let data_path = self.path(DATA_PREFIX, &name);
        let file = File::create(&data_path).context(storage_err(&data_path))?;
        let mut data = BufWriter::new(file);
        writeln!(data, "{DATA_HEADER}").context(storage_err(&data_path))?;

        info!("Session {} started: {}", self.session_id, data_path.display());
        self.open = Some(OpenSession {
            name,
            data_path,
            data,
        });
        Ok(self.session_id)
    }

    fn stop_session(&mut self) -> Result<()> {
        if let Some(mut session) = self.open.take() {
            session
                .data
                .flush()
                .context(storage_err(&session.data_path))?;
            info!("Session {} closed", session.name);
        }
        Ok(())
    }

    fn log_sample(&mut self, sample: &SampleRecord) -> Result<()> {
        let Some(session) = self.open.as_mut() else {
            return Err(KartboxError::NoActiveSession);
        };
        writeln!(
            session.data,
            "{},{:.6},{:.6},{:.1},{},{}",
            sample.timestamp_ms,
            sample.fix.lat,
            sample.fix.lon,
            sample.fix.speed_kmh,
            sample.mode.as_u8(),
            sample.lap
        )
        .context(storage_err(&session.data_path))
    }

    fn log_lap(&mut self, lap: &LapCompleted) -> Result<()> {
        let Some(name) = self.current_name() else {
            return Err(KartboxError::NoActiveSession);
        };
        let path = self.path(LAPS_PREFIX, name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(storage_err(&path))?;
        writeln!(
            file,
            "{},{},{:.1}",
            lap.lap,
            format_lap_seconds(lap.duration_ms),
            lap.avg_speed_kmh
        )
        .context(storage_err(&path))
    }
}

impl Drop for CsvSessionLog {
    fn drop(&mut self) {
        if let Err(e) = self.stop_session() {
            warn!("Closing session log failed: {e}");
        }
    }
}

/// Read-only view of recorded sessions
pub struct SessionArchive {
    dir: PathBuf,
}

impl SessionArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session names with a lap file, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(storage_err(&self.dir)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                file_name
                    .strip_prefix(LAPS_PREFIX)?
                    .strip_suffix(CSV_EXT)
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Lap history of one session, in file order
    pub fn load_laps(&self, name: &str) -> Result<Vec<LapRecord>> {
        let path = self.dir.join(format!("{LAPS_PREFIX}{name}{CSV_EXT}"));
        if !path.exists() {
            return Err(KartboxError::SessionNotFound {
                name: name.to_string(),
            });
        }
        let file = File::open(&path).context(storage_err(&path))?;

        let mut laps = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context(storage_err(&path))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_lap_line(&line).ok_or_else(|| KartboxError::MalformedLap {
                file: path.display().to_string(),
                line: line.clone(),
            })?;
            laps.push(record);
        }
        Ok(laps)
    }

    /// Delete every CSV file in the storage directory; the session counter stays
    pub fn delete_all(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).context(storage_err(&self.dir)),
        };

        let mut removed = 0;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                fs::remove_file(&path).context(storage_err(&path))?;
                removed += 1;
            }
        }
        info!("Deleted {} session files from {}", removed, self.dir.display());
        Ok(removed)
    }
}

/// `lap,S.mmm,avg`
fn parse_lap_line(line: &str) -> Option<LapRecord> {
    let mut fields = line.trim().split(',');
    let lap = fields.next()?.parse().ok()?;
    let (seconds, millis) = fields.next()?.split_once('.')?;
    let seconds: u32 = seconds.parse().ok()?;
    let millis: u32 = millis.parse().ok()?;
    let avg_speed_kmh = fields.next()?.parse().ok()?;
    Some(LapRecord {
        lap,
        duration_ms: seconds.checked_mul(1000)?.checked_add(millis)?,
        avg_speed_kmh,
    })
}
