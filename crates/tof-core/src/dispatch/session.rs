//! DAQ lifecycle state machine (spec.md §4.9 "DAQ lifecycle state machine").
//! A mutex + boolean `running` + worker thread handle, matching the
//! teacher's session-state pattern (`daemon::task_index` protects its index
//! the same way: a single mutex around state a background thread mutates on
//! exit).

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{info, warn};

use crate::daq::DaqWorker;

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("daq is already running")]
  AlreadyRunning,
  #[error("daq is not running")]
  NotRunning,
  #[error("daq initialization failed: {0}")]
  InitFailed(String),
}

struct SessionState {
  worker: Arc<DaqWorker>,
  running: bool,
  handle: Option<JoinHandle<()>>,
}

/// Owns the session state spec.md §4.9 describes: "A mutex + boolean
/// `running` + a worker thread handle form the session state."
pub struct DaqSession {
  state: Mutex<SessionState>,
}

impl DaqSession {
  pub fn new(worker: DaqWorker) -> Self {
    Self {
      state: Mutex::new(SessionState {
        worker: Arc::new(worker),
        running: false,
        handle: None,
      }),
    }
  }

  /// `START_DAQ`: fail if already running; else join any lingering thread,
  /// initialize, and launch the run thread (spec.md §4.9).
  pub fn start(&self) -> Result<(), SessionError> {
    let mut state = self.state.lock().unwrap();
    if state.running {
      return Err(SessionError::AlreadyRunning);
    }
    if let Some(handle) = state.handle.take() {
      let _ = handle.join();
    }

    Arc::get_mut(&mut state.worker)
      .expect("no outstanding daq worker references while stopped")
      .initialize()
      .map_err(|e| SessionError::InitFailed(e.to_string()))?;

    state.running = true;
    let worker = state.worker.clone();
    state.handle = Some(
      std::thread::Builder::new()
        .name("daq-worker".to_string())
        .spawn(move || {
          if let Err(e) = worker.run() {
            warn!(event = "daq_run_failed", error = %e, "daq run loop exited with error");
          }
        })
        .expect("spawn daq-worker thread"),
    );

    info!(event = "daq_session_started", "daq session started");
    Ok(())
  }

  /// `STOP_DAQ`: fail if not running; else stop and join (spec.md §4.9).
  pub fn stop(&self) -> Result<(), SessionError> {
    let mut state = self.state.lock().unwrap();
    if !state.running {
      return Err(SessionError::NotRunning);
    }
    state.worker.stop();
    if let Some(handle) = state.handle.take() {
      let _ = handle.join();
    }
    state.running = false;
    info!(event = "daq_session_stopped", "daq session stopped");
    Ok(())
  }

  /// `RESET_DAQ`: stop unconditionally, cleanup + reinitialize, relaunch
  /// (spec.md §4.9).
  pub fn reset(&self) -> Result<(), SessionError> {
    let mut state = self.state.lock().unwrap();
    if state.running {
      state.worker.stop();
    }
    if let Some(handle) = state.handle.take() {
      let _ = handle.join();
    }
    state.running = false;

    let worker = Arc::get_mut(&mut state.worker).expect("no outstanding daq worker references during reset");
    worker.cleanup();
    worker
      .initialize()
      .map_err(|e| SessionError::InitFailed(e.to_string()))?;

    state.running = true;
    let worker = state.worker.clone();
    state.handle = Some(
      std::thread::Builder::new()
        .name("daq-worker".to_string())
        .spawn(move || {
          if let Err(e) = worker.run() {
            warn!(event = "daq_run_failed", error = %e, "daq run loop exited with error");
          }
        })
        .expect("spawn daq-worker thread"),
    );

    info!(event = "daq_session_reset", "daq session reset");
    Ok(())
  }

  pub fn is_running(&self) -> bool {
    self.state.lock().unwrap().running
  }

  /// One-shot startup probe (spec.md §4.10 Failure semantics): attempt
  /// `initialize()` without starting the run thread, then release
  /// whatever it acquired, leaving the session stopped so the first real
  /// `START_DAQ` still gets a fresh `initialize()`.
  pub fn probe_initialize(&self) -> Result<(), SessionError> {
    let mut state = self.state.lock().unwrap();
    let worker = Arc::get_mut(&mut state.worker).expect("no outstanding daq worker references before startup");
    let result = worker.initialize().map_err(|e| SessionError::InitFailed(e.to_string()));
    worker.cleanup();
    result
  }
}
