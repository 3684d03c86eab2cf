//! TOF Flight Operations Control Core: the embedded control plane mediating
//! between a remote Hub and a SiPM/TOFPET2 detector readout system
//! (spec.md §1-§2). See `SPEC_FULL.md` for the full requirements this crate
//! implements.

pub mod codec;
pub mod config;
pub mod controller;
pub mod daq;
pub mod dispatch;
pub mod error;
pub mod fdreg;
pub mod link;
pub mod logging;
pub mod pipeline;
pub mod script;

pub use error::CoreError;
