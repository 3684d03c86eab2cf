//! Top-level error taxonomy (spec.md §7). Component modules define their
//! own specific error enums (`codec::CodecError`, `config::ConfigError`,
//! `link::LinkError`, `daq::DaqError`, `script::ScriptError`,
//! `dispatch::DispatchError`); `CoreError` only exists at the few
//! boundaries — controller startup, dispatch's single outermost catch-all
//! — that need to talk about all of them at once (spec.md §9: "collapse
//! broad catch-alls only at the outermost dispatch call site").

use thiserror::Error;

use crate::config::ConfigError;
use crate::daq::DaqError;
use crate::fdreg::ResourceError;

#[derive(Debug, Error)]
pub enum CoreError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Daq(#[from] DaqError),
  #[error(transparent)]
  Resource(#[from] ResourceError),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}
