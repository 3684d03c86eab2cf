//! DAQ Worker (C7, spec.md §4.7): owns the UNIX listener, the shared-memory
//! region, and the frame-server collaborator, and runs the accept/serve
//! loop that the Dispatch Core's lifecycle state machine (C9) drives.

use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use super::dma_ring::{DEFAULT_PARTITIONS, DmaDevice, MockDmaDevice, PARTITION_BYTES};
use super::error::DaqError;
use super::frame_server::{DaqKind, FrameServer};
use super::shm::SharedMemoryRegion;

/// Global stop flag shared with signal handlers (spec.md §5 Signals,
/// §4.7 "a global stop flag"). `Controller` wires `SIGINT`/`SIGTERM`/
/// `SIGHUP` to `request_stop()`.
static STOP_FLAG: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

pub fn request_stop() {
  STOP_FLAG.store(true, Ordering::SeqCst);
}

pub fn stop_requested() -> bool {
  STOP_FLAG.load(Ordering::SeqCst)
}

/// Clear the stop flag. Must run before a worker thread is (re)launched,
/// since the flag is level-triggered: a stale `true` left over from a
/// prior `stop()` would make `run()`'s `while !stop_requested()` exit
/// immediately without ever accepting a connection (spec.md §4.9
/// RESET_DAQ / repeated START_DAQ after STOP_DAQ).
pub(crate) fn clear_stop_flag() {
  STOP_FLAG.store(false, Ordering::SeqCst);
}

/// Epoll-style accept timeout (spec.md §4.7 Scheduling: "epoll timeout
/// 100 ms").
const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct DaqWorkerConfig {
  pub socket_path: PathBuf,
  pub shm_name: String,
  pub shm_len: usize,
  pub kind: DaqKind,
}

impl Default for DaqWorkerConfig {
  fn default() -> Self {
    Self {
      socket_path: PathBuf::from("/tmp/d.sock"),
      shm_name: "/daqd_shm".to_string(),
      shm_len: PARTITION_BYTES * DEFAULT_PARTITIONS,
      kind: DaqKind::Gbe,
    }
  }
}

/// Owns the resources a single DAQ session acquires and releases
/// (spec.md §4.7 initialize/run/stop/cleanup).
pub struct DaqWorker {
  config: DaqWorkerConfig,
  dma: Arc<dyn DmaDevice>,
  frame_server: Arc<dyn FrameServer>,
  listener: Option<UnixListener>,
  shm: Option<SharedMemoryRegion>,
}

impl DaqWorker {
  pub fn new(config: DaqWorkerConfig, dma: Arc<dyn DmaDevice>, frame_server: Arc<dyn FrameServer>) -> Self {
    Self {
      config,
      dma,
      frame_server,
      listener: None,
      shm: None,
    }
  }

  pub fn socket_path(&self) -> &Path {
    &self.config.socket_path
  }

  /// Create the listener, allocate shared memory, and (in hardware mode,
  /// out of scope here) open DAQ cards. Releases whatever was already
  /// acquired on any failing sub-step (spec.md §4.7 "all acquired
  /// resources are released on failure").
  pub fn initialize(&mut self) -> Result<(), DaqError> {
    clear_stop_flag();
    if self.config.socket_path.exists() {
      std::fs::remove_file(&self.config.socket_path)?;
    }
    let listener = UnixListener::bind(&self.config.socket_path)
      .map_err(|e| DaqError::Init(format!("bind {}: {e}", self.config.socket_path.display())))?;
    listener.set_nonblocking(true)?;

    let shm = match SharedMemoryRegion::create(&self.config.shm_name, self.config.shm_len) {
      Ok(shm) => shm,
      Err(e) => {
        let _ = std::fs::remove_file(&self.config.socket_path);
        return Err(e);
      }
    };

    self.listener = Some(listener);
    self.shm = Some(shm);
    info!(
      event = "daq_initialized",
      socket = %self.config.socket_path.display(),
      shm = %self.config.shm_name,
      "daq worker initialized"
    );
    Ok(())
  }

  /// Accept/serve loop (spec.md §4.7 run()). Returns once the global stop
  /// flag is observed and no connections remain to drain.
  pub fn run(&self) -> Result<(), DaqError> {
    let listener = self
      .listener
      .as_ref()
      .ok_or_else(|| DaqError::Init("run() called before initialize()".to_string()))?;

    while !stop_requested() {
      match listener.accept() {
        Ok((mut stream, _addr)) => {
          stream.set_nonblocking(false).ok();
          debug!(event = "daq_client_connected", "petsys frame client connected");
          loop {
            match self.frame_server.handle_request(&mut stream) {
              Ok(true) => continue,
              Ok(false) => break,
              Err(e) => {
                warn!(event = "daq_client_error", error = %e, "frame client handler error");
                break;
              }
            }
          }
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
          std::thread::sleep(ACCEPT_POLL_TIMEOUT);
        }
        Err(e) => {
          warn!(event = "daq_accept_error", error = %e, "accept failed");
          std::thread::sleep(ACCEPT_POLL_TIMEOUT);
        }
      }
    }
    info!(event = "daq_run_stopped", "daq worker run loop exiting");
    Ok(())
  }

  /// Signal the run loop to stop (spec.md §4.7 stop()).
  pub fn stop(&self) {
    request_stop();
  }

  /// Release the frame server, shared memory, and listener (spec.md §4.7
  /// cleanup()).
  pub fn cleanup(&mut self) {
    self.listener.take();
    if let Some(shm) = self.shm.take() {
      shm.cleanup();
    }
    let _ = std::fs::remove_file(&self.config.socket_path);
    info!(event = "daq_cleanup", "daq worker resources released");
  }

  pub fn dma(&self) -> &Arc<dyn DmaDevice> {
    &self.dma
  }
}

/// Convenience constructor for `--no-fpga` runs and tests.
pub fn mock_worker(socket_path: PathBuf, shm_name: String) -> DaqWorker {
  let dma: Arc<dyn DmaDevice> = Arc::new(MockDmaDevice::new(DEFAULT_PARTITIONS));
  let frame_server: Arc<dyn FrameServer> = Arc::new(super::frame_server::NullFrameServer);
  DaqWorker::new(
    DaqWorkerConfig {
      socket_path,
      shm_name,
      ..DaqWorkerConfig::default()
    },
    dma,
    frame_server,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::os::unix::net::UnixStream;

  fn temp_paths() -> (PathBuf, String) {
    let dir = std::env::temp_dir();
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap()
      .subsec_nanos();
    (
      dir.join(format!("tof-core-test-{pid}-{nanos}.sock")),
      format!("/tof-core-test-{pid}-{nanos}"),
    )
  }

  #[test]
  fn initialize_creates_socket_and_shm_then_cleanup_removes_them() {
    let (sock, shm) = temp_paths();
    let mut worker = mock_worker(sock.clone(), shm);
    worker.initialize().unwrap();
    assert!(sock.exists());
    worker.cleanup();
    assert!(!sock.exists());
  }

  #[test]
  fn run_exits_promptly_after_stop() {
    clear_stop_flag();
    let (sock, shm) = temp_paths();
    let mut worker = mock_worker(sock.clone(), shm);
    worker.initialize().unwrap();

    let worker = Arc::new(worker);
    let worker_clone = worker.clone();
    let handle = std::thread::spawn(move || {
      worker_clone.run().unwrap();
    });

    std::thread::sleep(Duration::from_millis(50));
    worker.stop();
    handle.join().unwrap();

    Arc::try_unwrap(worker).unwrap_or_else(|_| panic!("worker still shared")).cleanup();
    clear_stop_flag();
  }

  #[test]
  fn accepted_connection_is_torn_down_by_null_frame_server() {
    clear_stop_flag();
    let (sock, shm) = temp_paths();
    let mut worker = mock_worker(sock.clone(), shm);
    worker.initialize().unwrap();

    let worker = Arc::new(worker);
    let worker_clone = worker.clone();
    let handle = std::thread::spawn(move || {
      worker_clone.run().unwrap();
    });

    std::thread::sleep(Duration::from_millis(50));
    let _client = UnixStream::connect(&sock).unwrap();
    std::thread::sleep(Duration::from_millis(150));

    request_stop();
    handle.join().unwrap();
    clear_stop_flag();
    let _ = std::fs::remove_file(&sock);
  }
}
