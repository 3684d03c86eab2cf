use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum LinkError {
  #[error("transport error: {0}")]
  Transport(#[from] std::io::Error),
  #[error("protocol error: {0}")]
  Protocol(#[from] CodecError),
  #[error("link is not connected")]
  NotConnected,
}
