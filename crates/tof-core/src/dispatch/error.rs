use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("unknown command code 0x{0:04x}")]
  UnknownCode(u16),
}
