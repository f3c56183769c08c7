/// Session orchestration for the timer
///
/// One owner for all timing state. Each `tick` drains receiver bytes, runs
/// the engine, applies button events and pushes display snapshots. Storage
/// runs on the log worker; while a session save is in flight the
/// orchestrator is suspended and refuses engine mutations until the worker
/// confirms, then resets once.
use lap_timing::{
    FixStore, GpsFix, ImuSample, LapRecord, SampleRecord, Snapshot, TimingConfig, TimingEngine,
    NEW_BEST,
};
use log::{debug, info, warn};

use crate::{
    buttons::ButtonEvent,
    config::SystemConfig,
    display::{Display, Notice},
    log_worker::{LogCommand, LogOp, LogWorker, WorkerReport},
};

/// Laps shown in the display's lap list
pub const RECENT_LAPS: usize = 5;

/// Orchestrator timing knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    pub timing: TimingConfig,
    pub long_press_ms: u64,
    pub refresh_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&SystemConfig::default())
    }
}

impl From<&SystemConfig> for OrchestratorConfig {
    fn from(config: &SystemConfig) -> Self {
        Self {
            timing: config.timing,
            long_press_ms: config.long_press_ms,
            refresh_ms: config.display.refresh_ms,
        }
    }
}

/// Whether engine mutations are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Session end dispatched, waiting for the worker
    Saving,
}

/// Reset button hold tracking
#[derive(Debug, Default, Clone, Copy)]
struct ResetHold {
    pressed_at_ms: Option<u64>,
    /// The current press already ended a session
    consumed: bool,
}

pub struct SessionOrchestrator<D: Display> {
    config: OrchestratorConfig,
    store: FixStore,
    engine: TimingEngine,
    worker: LogWorker,
    display: D,
    state: SessionState,
    recording: bool,
    session_id: u16,
    reset: ResetHold,
    last_render_ms: Option<u64>,
}

impl<D: Display> SessionOrchestrator<D> {
    pub fn new(config: OrchestratorConfig, worker: LogWorker, display: D) -> Self {
        Self {
            store: FixStore::new(&config.timing),
            engine: TimingEngine::new(&config.timing),
            session_id: worker.initial_session_id(),
            worker,
            display,
            state: SessionState::Active,
            recording: false,
            reset: ResetHold::default(),
            last_render_ms: None,
            config,
        }
    }

    /// One polling cycle
    pub fn tick(&mut self, now_ms: u64, bytes: &[u8], events: &[ButtonEvent]) {
        let parsed = self.store.ingest(bytes, now_ms);
        let fix = self.store.latest();

        if self.state == SessionState::Active {
            if parsed > 0 {
                self.evaluate(&fix, now_ms);
            }
            if self.recording {
                self.send(LogCommand::Sample(SampleRecord {
                    timestamp_ms: now_ms,
                    fix,
                    imu: ImuSample::default(),
                    mode: self.engine.mode(),
                    lap: self.engine.lap_count(),
                }));
            }
        }

        for event in events {
            self.handle_event(*event, &fix, now_ms);
        }
        self.check_reset_hold(now_ms);
        self.collect_reports();

        let due = self
            .last_render_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.config.refresh_ms);
        if due {
            let snapshot = self.snapshot(now_ms);
            self.display.render(&snapshot);
            self.last_render_ms = Some(now_ms);
        }
    }

    fn evaluate(&mut self, fix: &GpsFix, now_ms: u64) {
        let evaluation = self.engine.evaluate(fix, now_ms);
        if let Some(lap) = evaluation.lap {
            if self.recording {
                self.send(LogCommand::Lap(lap));
            }
            self.display.notify(&Notice::LapCompleted {
                record: lap.record(),
                new_best: evaluation.has(NEW_BEST),
            });
            let recent: Vec<LapRecord> =
                self.engine.laps().rev().take(RECENT_LAPS).copied().collect();
            self.display.show_laps(&recent);
        }
    }

    fn handle_event(&mut self, event: ButtonEvent, fix: &GpsFix, now_ms: u64) {
        match event {
            ButtonEvent::ResetPressed => {
                self.reset = ResetHold {
                    pressed_at_ms: Some(now_ms),
                    consumed: false,
                };
            }
            ButtonEvent::ResetReleased { held_ms } => {
                let hold = std::mem::take(&mut self.reset);
                let observed = hold
                    .pressed_at_ms
                    .map_or(0, |pressed| now_ms.saturating_sub(pressed));
                let held = held_ms.max(observed);
                if self.state == SessionState::Saving || hold.consumed {
                    return;
                }
                self.handle_reset_release(held);
            }
            _ if self.state == SessionState::Saving => {
                debug!("Ignoring {:?} while session is being saved", event);
            }
            ButtonEvent::ModeToggle => {
                let mode = self.engine.toggle_mode();
                self.display.notify(&Notice::ModeChanged(mode));
            }
            ButtonEvent::SetFinishLine => {
                if self.engine.define_finish_line(fix, now_ms) {
                    self.recording = true;
                    self.send(LogCommand::StartSession(*fix));
                    self.display.notify(&Notice::Recording);
                } else {
                    self.display.notify(&Notice::NoGpsFix);
                }
            }
        }
    }

    fn handle_reset_release(&mut self, held_ms: u64) {
        let long = held_ms >= self.config.long_press_ms;
        match (long, self.recording) {
            (true, true) => self.end_session(),
            (true, false) => self.display.notify(&Notice::NoActiveSession),
            (false, true) => self.display.notify(&Notice::HoldToSave),
            (false, false) => {
                self.engine.reset();
                info!("Engine reset");
                self.display.notify(&Notice::EngineReset);
                self.display.show_laps(&[]);
            }
        }
    }

    /// A long hold ends the session without waiting for release
    fn check_reset_hold(&mut self, now_ms: u64) {
        let Some(pressed) = self.reset.pressed_at_ms else {
            return;
        };
        if self.reset.consumed || !self.recording || self.state == SessionState::Saving {
            return;
        }
        if now_ms.saturating_sub(pressed) >= self.config.long_press_ms {
            self.reset.consumed = true;
            self.end_session();
        }
    }

    fn end_session(&mut self) {
        info!("Ending session {}", self.session_id);
        self.recording = false;
        self.state = SessionState::Saving;
        self.display.notify(&Notice::Saving);
        if !self.send(LogCommand::StopSession) {
            // Nothing will report back
            self.finish_save();
        }
    }

    fn finish_save(&mut self) {
        self.engine.reset();
        self.state = SessionState::Active;
        self.display.show_laps(&[]);
    }

    fn collect_reports(&mut self) {
        let reports: Vec<WorkerReport> = self.worker.try_reports().collect();
        for report in reports {
            match report {
                WorkerReport::SessionStarted { id } => {
                    self.session_id = id;
                }
                WorkerReport::SessionStopped => {
                    if self.state == SessionState::Saving {
                        self.finish_save();
                        info!("Session {} saved", self.session_id);
                        self.display.notify(&Notice::SessionSaved);
                    }
                }
                WorkerReport::Failed { during, message } => {
                    if during == LogOp::Stop && self.state == SessionState::Saving {
                        self.finish_save();
                    }
                    self.display.notify(&Notice::StorageFailed(message));
                }
            }
        }
    }

    /// Returns false when the worker is gone; timing carries on regardless
    fn send(&mut self, command: LogCommand) -> bool {
        match self.worker.send(command) {
            Ok(()) => true,
            Err(e) => {
                if self.recording {
                    warn!("{e}, recording stopped");
                    self.recording = false;
                }
                false
            }
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        let fix = self.store.latest();
        let reset_progress = match self.reset.pressed_at_ms {
            Some(pressed) if self.recording && self.config.long_press_ms > 0 => {
                let held = now_ms.saturating_sub(pressed);
                Some((held * 100 / self.config.long_press_ms).min(100) as u8)
            }
            _ => None,
        };
        Snapshot {
            timing: self.engine.snapshot(now_ms),
            speed_kmh: fix.speed_kmh,
            status: self.store.status(now_ms),
            satellites: fix.satellites,
            session_id: self.session_id,
            recording: self.recording,
            reset_progress,
        }
    }

    pub fn engine(&self) -> &TimingEngine {
        &self.engine
    }

    pub fn store(&self) -> &FixStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Stop the worker, flushing any open session
    pub fn shutdown(self) -> D {
        self.worker.shutdown();
        self.display
    }
}
