//! Log worker thread
//!
//! Owns the session log so storage latency never reaches the polling loop.
//! Commands go in over one channel, completion reports come back over
//! another and are drained with `try_reports` once per tick.

use std::{
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use lap_timing::{GpsFix, LapCompleted, SampleRecord};
use log::{debug, warn};
use snafu::ResultExt;

use crate::{
    error::{KartboxError, Result, ThreadSpawnSnafu},
    session_log::SessionLog,
};

#[derive(Debug, Clone, Copy)]
pub enum LogCommand {
    StartSession(GpsFix),
    StopSession,
    Sample(SampleRecord),
    Lap(LapCompleted),
    Shutdown,
}

/// Operation a failure report refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    Start,
    Stop,
    Sample,
    Lap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReport {
    SessionStarted { id: u16 },
    SessionStopped,
    Failed { during: LogOp, message: String },
}

pub struct LogWorker {
    commands: Sender<LogCommand>,
    reports: Receiver<WorkerReport>,
    handle: Option<JoinHandle<()>>,
    initial_session_id: u16,
}

impl LogWorker {
    pub fn spawn<L>(log: L) -> Result<Self>
    where
        L: SessionLog + 'static,
    {
        let initial_session_id = log.session_id();
        let (command_tx, command_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("log-worker".into())
            .spawn(move || run(log, command_rx, report_tx))
            .context(ThreadSpawnSnafu { name: "log-worker" })?;

        Ok(Self {
            commands: command_tx,
            reports: report_rx,
            handle: Some(handle),
            initial_session_id,
        })
    }

    /// Session id restored from storage at spawn time
    pub fn initial_session_id(&self) -> u16 {
        self.initial_session_id
    }

    pub fn send(&self, command: LogCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| KartboxError::WorkerGone)
    }

    /// Reports received since the last call, never blocks
    pub fn try_reports(&self) -> impl Iterator<Item = WorkerReport> + '_ {
        self.reports.try_iter()
    }

    /// Flush pending commands and stop the thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(LogCommand::Shutdown);
            if handle.join().is_err() {
                warn!("Log worker thread panicked");
            }
        }
    }
}

impl Drop for LogWorker {
    fn drop(&mut self) {
        self.join();
    }
}

fn run<L: SessionLog>(mut log: L, commands: Receiver<LogCommand>, reports: Sender<WorkerReport>) {
    // Only the first of a run of sample failures is reported
    let mut samples_failing = false;

    for command in &commands {
        let report = match command {
            LogCommand::StartSession(fix) => match log.start_session(&fix) {
                Ok(id) => {
                    samples_failing = false;
                    Some(WorkerReport::SessionStarted { id })
                }
                Err(e) => Some(failed(LogOp::Start, &e)),
            },
            LogCommand::StopSession => match log.stop_session() {
                Ok(()) => Some(WorkerReport::SessionStopped),
                Err(e) => Some(failed(LogOp::Stop, &e)),
            },
            LogCommand::Sample(sample) => match log.log_sample(&sample) {
                Ok(()) => {
                    samples_failing = false;
                    None
                }
                Err(e) if !samples_failing => {
                    samples_failing = true;
                    Some(failed(LogOp::Sample, &e))
                }
                Err(_) => None,
            },
            LogCommand::Lap(lap) => match log.log_lap(&lap) {
                Ok(()) => None,
                Err(e) => Some(failed(LogOp::Lap, &e)),
            },
            LogCommand::Shutdown => break,
        };

        if let Some(report) = report {
            if reports.send(report).is_err() {
                debug!("Report receiver gone, log worker exiting");
                break;
            }
        }
    }

    if let Err(e) = log.stop_session() {
        warn!("Closing session on worker exit failed: {e}");
    }
}

fn failed(during: LogOp, error: &KartboxError) -> WorkerReport {
    warn!("Session log {:?} failed: {}", during, error);
    WorkerReport::Failed {
        during,
        message: error.to_string(),
    }
}
