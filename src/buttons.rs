//! Discrete operator input
//!
//! The device has three buttons: mode, set line and reset (with a hold-to-save
//! long press). On a workstation they are typed commands, one per line:
//!
//! | command        | events                                   |
//! |----------------|------------------------------------------|
//! | `m`, `mode`    | ModeToggle                               |
//! | `l`, `line`    | SetFinishLine                            |
//! | `r`, `reset`   | ResetPressed, ResetReleased (short)      |
//! | `s`, `save`    | ResetPressed, ResetReleased (long press) |

use std::{
    io::{self, BufRead, BufReader},
    sync::mpsc::{self, Receiver},
    thread,
};

use log::{debug, warn};
use snafu::ResultExt;

use crate::error::{Result, ThreadSpawnSnafu};

/// Edge-triggered button events, consumed once per poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ModeToggle,
    SetFinishLine,
    ResetPressed,
    ResetReleased { held_ms: u64 },
}

/// Translate one command line into button events
pub fn parse_command(line: &str, long_press_ms: u64) -> Option<Vec<ButtonEvent>> {
    let events = match line.trim().to_ascii_lowercase().as_str() {
        "m" | "mode" => vec![ButtonEvent::ModeToggle],
        "l" | "line" => vec![ButtonEvent::SetFinishLine],
        "r" | "reset" => vec![
            ButtonEvent::ResetPressed,
            ButtonEvent::ResetReleased { held_ms: 0 },
        ],
        "s" | "save" => vec![
            ButtonEvent::ResetPressed,
            ButtonEvent::ResetReleased {
                held_ms: long_press_ms,
            },
        ],
        _ => return None,
    };
    Some(events)
}

/// Reads commands on a background thread
pub struct CommandPanel {
    events: Receiver<ButtonEvent>,
}

impl CommandPanel {
    pub fn spawn<R>(reader: R, long_press_ms: u64) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("command-panel".into())
            .spawn(move || {
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("Command input failed: {e}");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Some(events) = parse_command(&line, long_press_ms) else {
                        warn!("Unknown command {:?} (m, l, r, s)", line.trim());
                        continue;
                    };
                    for event in events {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
                debug!("Command input closed");
            })
            .context(ThreadSpawnSnafu {
                name: "command-panel",
            })?;

        Ok(Self { events: rx })
    }

    pub fn stdin(long_press_ms: u64) -> Result<Self> {
        Self::spawn(BufReader::new(io::stdin()), long_press_ms)
    }

    /// Events received since the last call
    pub fn drain(&self) -> Vec<ButtonEvent> {
        self.events.try_iter().collect()
    }
}
