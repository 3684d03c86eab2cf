//! Command Link (C4) and Event Link (C5): the dual-role TCP client that
//! mediates all control-plane traffic with the Hub (spec.md §4.4, §4.5).
//! There is no server role in this core (spec.md §9 design note); both
//! links are outbound TCP clients with automatic reconnect.

mod command_link;
mod error;
mod event_link;
mod reassembly;

pub use command_link::CommandLink;
pub use error::LinkError;
pub use event_link::EventLink;
pub use reassembly::{Drained, Reassembler};

use std::time::Duration;

/// Backoff after a connect() failure (spec.md §4.4).
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(5);
/// Backoff after a socket error on an established connection (spec.md §4.4).
pub const SOCKET_ERROR_BACKOFF: Duration = Duration::from_secs(2);
/// Read-timeout ceiling used to poll the running flag (spec.md §4.4, §5).
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Scratch read size per spec.md §4.4 step 1.
pub const READ_CHUNK: usize = 1024;
