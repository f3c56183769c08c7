//! Driver display
//!
//! The orchestrator pushes a [`Snapshot`] every refresh interval and a
//! [`Notice`] for one-off popups. Rendering never feeds back into timing.

use std::io::{self, Write};

use lap_timing::{LapRecord, RaceMode, Snapshot};
use log::{info, warn};
use serde::Serialize;

/// One-off operator messages
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ModeChanged(RaceMode),
    /// Finish line set, session recording
    Recording,
    /// Finish line requested without a valid fix
    NoGpsFix,
    /// Engine cleared by a short reset press
    EngineReset,
    /// Short reset press while recording
    HoldToSave,
    /// Long reset press with nothing recording
    NoActiveSession,
    /// Session end dispatched to the log worker
    Saving,
    SessionSaved,
    LapCompleted { record: LapRecord, new_best: bool },
    StorageFailed(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::ModeChanged(mode) => format!("MODE: {}", mode.as_str()),
            Self::Recording => "RECORDING...".to_string(),
            Self::NoGpsFix => "NO GPS SIGNAL".to_string(),
            Self::EngineReset => "CLEARED".to_string(),
            Self::HoldToSave => "HOLD 2s TO SAVE".to_string(),
            Self::NoActiveSession => "NO ACTIVE SESSION".to_string(),
            Self::Saving => "SAVING...".to_string(),
            Self::SessionSaved => "SESSION SAVED".to_string(),
            Self::LapCompleted { record, new_best } => format!(
                "LAP {}: {}{}",
                record.lap,
                format_time(record.duration_ms),
                if *new_best { " BEST" } else { "" }
            ),
            Self::StorageFailed(reason) => format!("STORAGE ERROR: {reason}"),
        }
    }
}

pub trait Display {
    fn render(&mut self, snapshot: &Snapshot);
    fn notify(&mut self, notice: &Notice);
    /// Recent laps, newest first, refreshed after every completed lap
    fn show_laps(&mut self, laps: &[LapRecord]);
}

/// `MM:SS.mmm`
pub fn format_time(ms: u32) -> String {
    format!(
        "{:02}:{:02}.{:03}",
        ms / 60_000,
        (ms % 60_000) / 1000,
        ms % 1000
    )
}

/// Signed seconds with two decimals, `+1.50` / `-0.25`
pub fn format_delta(delta_ms: i32) -> String {
    format!("{:+.2}", f64::from(delta_ms) / 1000.0)
}

#[derive(Serialize)]
struct LapList<'a> {
    laps: &'a [LapRecord],
}

/// Lap list rows `LAP  TIME  AVG`, the fastest one starred
pub fn lap_table(laps: &[LapRecord]) -> Vec<String> {
    let best = laps.iter().map(|lap| lap.duration_ms).min();
    laps.iter()
        .map(|lap| {
            format!(
                "{:>4}  {:>10}  {:>8.1}{}",
                lap.lap,
                format_time(lap.duration_ms),
                lap.avg_speed_kmh,
                if Some(lap.duration_ms) == best { "  *" } else { "" }
            )
        })
        .collect()
}

/// Status line renderer for a terminal, or JSON lines for piping
pub struct TerminalDisplay<W: Write> {
    out: W,
    json: bool,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout(json: bool) -> Self {
        Self::new(io::stdout(), json)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn status_line(snapshot: &Snapshot) -> String {
        let timing = &snapshot.timing;
        let best = timing
            .best_lap_ms
            .map_or_else(|| "--:--.---".to_string(), format_time);
        let delta = if timing.best_lap_ms.is_some() {
            format_delta(timing.delta_ms)
        } else {
            "--".to_string()
        };
        let clock = if timing.awaiting_start {
            "READY".to_string()
        } else {
            format_time(timing.elapsed_ms)
        };
        let mut line = format!(
            "{:<10} {} {:>6} | LAP {:>3} | BEST {} | {:>3} KM/H | {} ({} sats) | #{}",
            timing.mode.as_str(),
            clock,
            delta,
            timing.lap_count,
            best,
            snapshot.speed_kmh as u32,
            snapshot.status.as_str(),
            snapshot.satellites,
            snapshot.session_id,
        );
        if snapshot.recording {
            line.push_str(" REC");
        }
        if let Some(progress) = snapshot.reset_progress {
            line.push_str(&format!(" [save {progress:>3}%]"));
        }
        line
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn render(&mut self, snapshot: &Snapshot) {
        let result = if self.json {
            match serde_json::to_string(snapshot) {
                Ok(json) => writeln!(self.out, "{json}"),
                Err(e) => {
                    warn!("Snapshot serialization failed: {e}");
                    return;
                }
            }
        } else {
            write!(self.out, "\r{}\x1b[K", Self::status_line(snapshot))
        };
        if let Err(e) = result.and_then(|_| self.out.flush()) {
            warn!("Display write failed: {e}");
        }
    }

    fn notify(&mut self, notice: &Notice) {
        info!("{}", notice.message());
    }

    fn show_laps(&mut self, laps: &[LapRecord]) {
        let result = if self.json {
            match serde_json::to_string(&LapList { laps }) {
                Ok(json) => writeln!(self.out, "{json}"),
                Err(e) => {
                    warn!("Lap list serialization failed: {e}");
                    return;
                }
            }
        } else {
            // Clear the status line; the next render redraws it below the list
            write!(self.out, "\r\x1b[K").and_then(|_| {
                lap_table(laps)
                    .iter()
                    .try_for_each(|row| writeln!(self.out, "{row}"))
            })
        };
        if let Err(e) = result.and_then(|_| self.out.flush()) {
            warn!("Display write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lap_timing::{GpsStatus, TimingSnapshot};

    fn snapshot() -> Snapshot {
        Snapshot {
            timing: TimingSnapshot {
                elapsed_ms: 61_234,
                delta_ms: -1_250,
                lap_count: 3,
                last_lap_ms: Some(63_000),
                best_lap_ms: Some(62_484),
                mode: RaceMode::Qualifying,
                awaiting_start: false,
                line_defined: true,
            },
            speed_kmh: 54.9,
            status: GpsStatus::Fixed,
            satellites: 9,
            session_id: 12,
            recording: true,
            reset_progress: None,
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00.000");
        assert_eq!(format_time(61_234), "01:01.234");
        assert_eq!(format_time(3_599_999), "59:59.999");
        assert_eq!(format_time(6_000_000), "100:00.000");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(1_500), "+1.50");
        assert_eq!(format_delta(-250), "-0.25");
        assert_eq!(format_delta(0), "+0.00");
    }

    #[test]
    fn test_status_line() {
        let mut display = TerminalDisplay::new(Vec::new(), false);
        display.render(&snapshot());
        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(text.contains("QUALIFYING"));
        assert!(text.contains("01:01.234"));
        assert!(text.contains("-1.25"));
        assert!(text.contains("LAP   3"));
        assert!(text.contains("BEST 01:02.484"));
        assert!(text.contains(" 54 KM/H"));
        assert!(text.contains("FIX (9 sats)"));
        assert!(text.contains("REC"));
    }

    #[test]
    fn test_awaiting_start_shows_ready() {
        let mut snap = snapshot();
        snap.timing.awaiting_start = true;
        snap.timing.best_lap_ms = None;
        snap.reset_progress = Some(40);
        let line = TerminalDisplay::<Vec<u8>>::status_line(&snap);
        assert!(line.contains("READY"));
        assert!(line.contains("--:--.---"));
        assert!(line.contains("[save  40%]"));
    }

    #[test]
    fn test_json_lines() {
        let mut display = TerminalDisplay::new(Vec::new(), true);
        display.render(&snapshot());
        let text = String::from_utf8(display.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["lap_count"], 3);
        assert_eq!(value["status"], "Fixed");
        assert_eq!(value["mode"], "Qualifying");
        assert_eq!(value["best_lap_ms"], 62_484);
    }

    fn record(lap: u16, duration_ms: u32) -> LapRecord {
        LapRecord {
            lap,
            duration_ms,
            avg_speed_kmh: 48.3,
        }
    }

    #[test]
    fn test_lap_table_stars_fastest() {
        let rows = lap_table(&[record(3, 61_000), record(2, 59_500), record(1, 62_100)]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "   3   01:01.000      48.3");
        assert!(rows[1].ends_with("  *"));
        assert!(!rows[2].ends_with("  *"));
    }

    #[test]
    fn test_show_laps() {
        let mut display = TerminalDisplay::new(Vec::new(), false);
        display.show_laps(&[record(2, 59_500), record(1, 62_100)]);
        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(text.contains("00:59.500"));
        assert!(text.contains("01:02.100"));
        assert_eq!(text.lines().count(), 2);

        let mut display = TerminalDisplay::new(Vec::new(), true);
        display.show_laps(&[record(1, 62_100)]);
        let text = String::from_utf8(display.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["laps"][0]["duration_ms"], 62_100);
    }

    #[test]
    fn test_notice_messages() {
        let notice = Notice::LapCompleted {
            record: LapRecord {
                lap: 4,
                duration_ms: 59_100,
                avg_speed_kmh: 60.0,
            },
            new_best: true,
        };
        assert_eq!(notice.message(), "LAP 4: 00:59.100 BEST");
        assert_eq!(
            Notice::ModeChanged(RaceMode::Racing).message(),
            "MODE: RACE"
        );
    }
}
