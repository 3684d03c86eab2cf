//! Config Store (C3): typed, variable-substituted `(section, key)` lookups
//! plus the timestamp/path helpers the dispatch and pipeline layers use to
//! publish calibration artifacts. Structured the way
//! `agency-core::config` splits `types`/`load`/`paths`/`defaults`/`validate`,
//! adapted from TOML to the INI-style format spec.md §3 describes
//! (keyed by `(section, key)`, matching
//! `original_source/FlightOps/src/GRAMS_TOF_Config.cpp`).

pub mod defaults;
mod load;
mod substitute;
pub mod timestamp;
mod types;
mod validate;

pub use defaults::{DEFAULT_COMMAND_PORT, DEFAULT_DAQ_SOCKET_PATH, DEFAULT_EVENT_PORT, DEFAULT_SHM_NAME};
pub use load::load;
pub use types::{Config, ConfigError, Result};
