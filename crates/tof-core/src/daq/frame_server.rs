//! Frame-server collaborator boundary (spec.md §4.7). The PETSYS wire
//! protocol a connected client speaks against this server is explicitly a
//! Non-goal (spec.md §1 "RawReader/frame-server/DAQ-client internals"); this
//! module only defines the seam the DAQ Worker calls through, plus a no-op
//! implementation used by `--no-fpga` runs and tests.

use std::os::unix::net::UnixStream;

use super::error::DaqError;

/// Which downstream readout path feeds the frame server (spec.md §4.7).
#[derive(Debug, Clone)]
pub enum DaqKind {
  /// Gigabit-Ethernet readout.
  Gbe,
  /// PFP_KX7 card-based readout, addressed by card index.
  PfpKx7 { cards: Vec<u32> },
}

/// Per-connection request handler (spec.md §4.7 "handleRequest()"). A `false`
/// or `Err` return tears the connection down; internals are a Non-goal.
pub trait FrameServer: Send + Sync {
  fn handle_request(&self, conn: &mut UnixStream) -> Result<bool, DaqError>;
}

/// Frame server used for `--no-fpga` runs and tests: accepts connections,
/// never produces PETSYS frames.
pub struct NullFrameServer;

impl FrameServer for NullFrameServer {
  fn handle_request(&self, _conn: &mut UnixStream) -> Result<bool, DaqError> {
    Ok(false)
  }
}
