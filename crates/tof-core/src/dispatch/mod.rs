//! Dispatch Core (C9, spec.md §4.9): `CommandCode → (argv) → bool`, the
//! DAQ lifecycle state machine, and argument parsing with documented
//! defaults for every code in the catalog.

mod error;
mod session;

pub use error::DispatchError;
pub use session::{DaqSession, SessionError};

use std::collections::HashMap;

use tracing::{error, warn};

use crate::codec::CommandCode;
use crate::pipeline::{ConvertArgs, ConvertKind, PipelineExecutor, ProcessArgs, ProcessKind};
use crate::script::{Routine, ScriptExecutor, ThresholdMode};

/// Read `argv[idx]`, falling back to `default` when the packet omitted
/// that trailing position (spec.md §4.9 "missing positions fall back to
/// defaults").
fn arg_i32(argv: &[i32], idx: usize, default: i32) -> i32 {
  argv.get(idx).copied().unwrap_or(default)
}

fn arg_bool(argv: &[i32], idx: usize, default: bool) -> bool {
  argv.get(idx).map(|v| *v != 0).unwrap_or(default)
}

/// `argv[i]` reinterpreted as a float by cast, not bit-reinterpretation
/// (SPEC_FULL.md §12.2, matching the original source's behavior).
fn arg_f32_cast(argv: &[i32], idx: usize, default: f32) -> f32 {
  argv.get(idx).map(|v| *v as f32).unwrap_or(default)
}

pub struct Dispatcher {
  session: DaqSession,
  scripts: ScriptExecutor,
  pipeline: PipelineExecutor,
  routine_env: HashMap<String, String>,
}

impl Dispatcher {
  pub fn new(
    session: DaqSession,
    scripts: ScriptExecutor,
    pipeline: PipelineExecutor,
    routine_env: HashMap<String, String>,
  ) -> Self {
    Self {
      session,
      scripts,
      pipeline,
      routine_env,
    }
  }

  /// Dispatch one command. Never panics or propagates: exceptions from any
  /// sub-call are caught at this single outermost call site and turned
  /// into `false` (spec.md §4.9, §7 "collapse broad catch-alls only at the
  /// outermost dispatch call site").
  pub fn dispatch(&self, code: CommandCode, argv: &[i32]) -> bool {
    match code {
      CommandCode::StartDaq => self.session.start().is_ok(),
      CommandCode::StopDaq => self.session.stop().is_ok(),
      CommandCode::ResetDaq => self.session.reset().is_ok(),

      CommandCode::InitSystem => self.scripts.run(Routine::InitSystem, &[], &self.routine_env),

      CommandCode::MakeBiasCalibTable => {
        let port_id = arg_i32(argv, 0, 0);
        let slave_id = arg_i32(argv, 1, 0);
        let slot_id = arg_i32(argv, 2, 0);
        let args = [port_id.to_string(), slave_id.to_string(), slot_id.to_string()];
        self
          .scripts
          .run(Routine::MakeBiasCalibrationTable, &args, &self.routine_env)
      }

      CommandCode::MakeSimpleBiasSetTable => {
        let offset = arg_f32_cast(argv, 0, 0.0);
        let prebd = arg_f32_cast(argv, 1, 0.0);
        let bd = arg_f32_cast(argv, 2, 0.0);
        let over = arg_f32_cast(argv, 3, 0.0);
        let args = [offset.to_string(), prebd.to_string(), bd.to_string(), over.to_string()];
        self
          .scripts
          .run(Routine::MakeSimpleBiasSettingsTable, &args, &self.routine_env)
      }

      CommandCode::MakeSimpleChannelMap => {
        self
          .scripts
          .run(Routine::MakeSimpleChannelMap, &[], &self.routine_env)
      }

      CommandCode::MakeSimpleDiscSetTable => {
        let vth_t1 = arg_i32(argv, 0, 0);
        let vth_t2 = arg_i32(argv, 1, 0);
        let vth_e = arg_i32(argv, 2, 0);
        let args = [vth_t1.to_string(), vth_t2.to_string(), vth_e.to_string()];
        self
          .scripts
          .run(Routine::MakeSimpleDiscSettingsTable, &args, &self.routine_env)
      }

      CommandCode::ReadTemperatureSensors => {
        let acq_time = arg_i32(argv, 0, 60);
        let interval = arg_i32(argv, 1, 1);
        let startup = arg_i32(argv, 2, 0);
        let debug = arg_bool(argv, 3, false);
        let args = [
          acq_time.to_string(),
          interval.to_string(),
          startup.to_string(),
          debug.to_string(),
        ];
        self
          .scripts
          .run(Routine::ReadTemperatureSensors, &args, &self.routine_env)
      }

      CommandCode::AcquireThresholdCalibration => {
        self.run_threshold_calibration(ThresholdMode::All, argv)
      }
      CommandCode::AcquireThresholdCalibrationBaselineNoise => {
        self.run_threshold_calibration(ThresholdMode::BaselineNoise, argv)
      }
      CommandCode::AcquireThresholdCalibrationDark => {
        self.run_threshold_calibration(ThresholdMode::Dark, argv)
      }

      CommandCode::AcquireTdcCalibration => {
        self.scripts.run(Routine::AcquireTdcCalibration, &[], &self.routine_env)
      }
      CommandCode::AcquireQdcCalibration => {
        self.scripts.run(Routine::AcquireQdcCalibration, &[], &self.routine_env)
      }
      CommandCode::AcquireSipmData => {
        let acquisition_time = arg_i32(argv, 0, 60);
        let hw_trigger = arg_bool(argv, 1, false);
        let args = [acquisition_time.to_string(), hw_trigger.to_string()];
        self.scripts.run(Routine::AcquireSipmData, &args, &self.routine_env)
      }

      CommandCode::ProcessThresholdCalibration => {
        self.pipeline.process(ProcessKind::Threshold, &process_args(argv))
      }
      CommandCode::ProcessTdcCalibration => self.pipeline.process(ProcessKind::Tdc, &process_args(argv)),
      CommandCode::ProcessQdcCalibration => self.pipeline.process(ProcessKind::Qdc, &process_args(argv)),

      CommandCode::ConvertRawToRaw => self.pipeline.convert(ConvertKind::RawToRaw, &convert_args(argv, true)),
      CommandCode::ConvertRawToSingles => {
        self.pipeline.convert(ConvertKind::RawToSingles, &convert_args(argv, false))
      }

      CommandCode::HeartBeat => {
        // Receive-only per SPEC_FULL.md §12.1: structurally ACKed by the
        // Command Link; the handler itself is a no-op.
        true
      }

      CommandCode::Ack | CommandCode::Callback | CommandCode::DummyTest => {
        warn!(event = "dispatch_sentinel_code", code = code.name(), "sentinel code dispatched directly");
        false
      }
    }
  }

  fn run_threshold_calibration(&self, mode: ThresholdMode, argv: &[i32]) -> bool {
    let noise_reads = arg_i32(argv, 0, 0);
    let dark_reads = arg_i32(argv, 1, 0);
    let ext_bias = arg_bool(argv, 2, false);
    let args = [noise_reads.to_string(), dark_reads.to_string(), ext_bias.to_string()];
    self
      .scripts
      .run(Routine::AcquireThresholdCalibration(mode), &args, &self.routine_env)
  }

  pub fn is_daq_running(&self) -> bool {
    self.session.is_running()
  }

  /// Startup DAQ initialization probe (spec.md §4.10); see
  /// `DaqSession::probe_initialize`.
  pub fn probe_daq_initialize(&self) -> Result<(), SessionError> {
    self.session.probe_initialize()
  }
}

fn process_args(argv: &[i32]) -> ProcessArgs {
  ProcessArgs {
    do_sorting: arg_bool(argv, 0, true),
    keep_tmp: arg_bool(argv, 1, false),
    nominal_m: arg_i32(argv, 2, 0),
  }
}

/// `CONVERT_RAW_TO_RAW` carries a leading `fileType` argument that
/// `CONVERT_RAW_TO_SINGLES` does not (spec.md §6 "(fileType,)
/// eventFraction, splitTime").
fn convert_args(argv: &[i32], has_file_type: bool) -> ConvertArgs {
  if has_file_type {
    ConvertArgs {
      file_type: Some(arg_i32(argv, 0, 0)),
      event_fraction: arg_i32(argv, 1, 100),
      split_time: arg_i32(argv, 2, 0),
    }
  } else {
    ConvertArgs {
      file_type: None,
      event_fraction: arg_i32(argv, 0, 100),
      split_time: arg_i32(argv, 1, 0),
    }
  }
}

/// Translate an unknown wire code and log it (spec.md §4.9 "Unknown codes
/// log an error and return false").
pub fn unknown_code(code: u16) -> bool {
  error!(event = "dispatch_unknown_code", code, "unknown command code");
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::daq::mock_worker;
  use std::io::Write;

  fn test_config(pairs: &[(&str, &str, &str)]) -> Config {
    let td = tempfile::tempdir().unwrap();
    let config_path = td.path().join("tof.cfg");
    let mut f = std::fs::File::create(&config_path).unwrap();
    let mut by_section: std::collections::BTreeMap<&str, Vec<(&str, &str)>> = Default::default();
    for (section, key, value) in pairs {
      by_section.entry(section).or_default().push((key, value));
    }
    for (section, kvs) in by_section {
      writeln!(f, "[{section}]").unwrap();
      for (k, v) in kvs {
        writeln!(f, "{k} = {v}").unwrap();
      }
    }
    drop(f);
    std::mem::forget(td);
    crate::config::load(&config_path).unwrap()
  }

  fn dispatcher() -> Dispatcher {
    let config = test_config(&[("scripts", "init_system", "/bin/true")]);
    let pipeline_config = test_config(&[]);
    let sock = std::env::temp_dir().join(format!("tof-core-dispatch-{}.sock", std::process::id()));
    let shm = format!("/tof-core-dispatch-{}", std::process::id());
    let session = DaqSession::new(mock_worker(sock, shm));
    let scripts = ScriptExecutor::new(config, std::path::PathBuf::from("/"));
    let pipeline = PipelineExecutor::new(pipeline_config, std::env::temp_dir());
    Dispatcher::new(session, scripts, pipeline, HashMap::new())
  }

  #[test]
  fn unknown_sentinel_codes_return_false() {
    let d = dispatcher();
    assert!(!d.dispatch(CommandCode::Ack, &[]));
    assert!(!d.dispatch(CommandCode::Callback, &[]));
  }

  #[test]
  fn heartbeat_is_a_no_op_success() {
    let d = dispatcher();
    assert!(d.dispatch(CommandCode::HeartBeat, &[]));
  }

  #[test]
  fn init_system_runs_configured_command() {
    let d = dispatcher();
    assert!(d.dispatch(CommandCode::InitSystem, &[]));
  }

  #[test]
  fn start_stop_daq_lifecycle_round_trips() {
    let d = dispatcher();
    assert!(d.dispatch(CommandCode::StartDaq, &[]));
    assert!(d.is_daq_running());
    // A second START_DAQ while running must fail (spec.md §4.9).
    assert!(!d.dispatch(CommandCode::StartDaq, &[]));
    assert!(d.dispatch(CommandCode::StopDaq, &[]));
    assert!(!d.is_daq_running());
    // STOP_DAQ while not running must fail.
    assert!(!d.dispatch(CommandCode::StopDaq, &[]));
  }

  #[test]
  fn missing_argv_positions_fall_back_to_documented_defaults() {
    let args = convert_args(&[], false);
    assert_eq!(args.event_fraction, 100);
    assert_eq!(args.split_time, 0);
    assert_eq!(args.file_type, None);

    let args = convert_args(&[7], true);
    assert_eq!(args.file_type, Some(7));
    assert_eq!(args.event_fraction, 100);
  }

  #[test]
  fn bias_set_table_args_are_cast_not_bit_reinterpreted() {
    // argv[i] = 5 (an i32) must become 5.0f32 by cast, not
    // f32::from_bits(5).
    assert_eq!(arg_f32_cast(&[5], 0, 0.0), 5.0f32);
    assert_ne!(arg_f32_cast(&[5], 0, 0.0), f32::from_bits(5u32));
  }
}
