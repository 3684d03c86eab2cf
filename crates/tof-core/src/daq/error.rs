use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaqError {
  #[error("daq is already running")]
  AlreadyRunning,
  #[error("daq is not running")]
  NotRunning,
  #[error("daq initialization failed: {0}")]
  Init(String),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("shared memory error: {0}")]
  SharedMemory(String),
}
