//! Offline processing pipeline boundary (spec.md §4.9c, §6 Filesystem,
//! §8 property 8 "Publish atomicity"). Pipeline *internals* (the
//! threshold/TDC/QDC sorting algorithms, raw-to-singles conversion) are a
//! Non-goal; this module only resolves the external pipeline command, runs
//! it against latest-timestamp-derived paths, and — for `PROCESS_*`
//! calibrations — publishes the result via the Config Store's
//! `copy_or_link` (spec.md §4.3).

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::timestamp::{copy_or_link, file_path_with_timestamp, latest_timestamp, TimestampError};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
  Threshold,
  Tdc,
  Qdc,
}

impl ProcessKind {
  fn dir_prefix(self) -> &'static str {
    match self {
      ProcessKind::Threshold => "disc",
      ProcessKind::Tdc => "tdc",
      ProcessKind::Qdc => "qdc",
    }
  }

  fn canonical_key(self) -> &'static str {
    match self {
      ProcessKind::Threshold => "disc_calibration_table",
      ProcessKind::Tdc => "tdc_calibration_table",
      ProcessKind::Qdc => "qdc_calibration_table",
    }
  }

  fn pipeline_config_key(self) -> &'static str {
    match self {
      ProcessKind::Threshold => "process_threshold_calibration",
      ProcessKind::Tdc => "process_tdc_calibration",
      ProcessKind::Qdc => "process_qdc_calibration",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertKind {
  RawToRaw,
  RawToSingles,
}

impl ConvertKind {
  fn pipeline_config_key(self) -> &'static str {
    match self {
      ConvertKind::RawToRaw => "convert_raw_to_raw",
      ConvertKind::RawToSingles => "convert_raw_to_singles",
    }
  }
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("no input found under {dir} for kind `{kind}`", dir = .0.display())]
  NoInput(PathBuf, &'static str),
  #[error("pipeline command for `{0}` not configured under [pipeline]")]
  MissingCommand(&'static str),
  #[error("publish failed: {0}")]
  Publish(#[from] TimestampError),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

/// Arguments common to `PROCESS_THRESHOLD/TDC/QDC_CALIBRATION` (spec.md §6).
pub struct ProcessArgs {
  pub do_sorting: bool,
  pub keep_tmp: bool,
  pub nominal_m: i32,
}

/// Arguments common to `CONVERT_RAW_TO_RAW`/`CONVERT_RAW_TO_SINGLES` (spec.md §6).
pub struct ConvertArgs {
  pub file_type: Option<i32>,
  pub event_fraction: i32,
  pub split_time: i32,
}

pub struct PipelineExecutor {
  config: Config,
  tofdata_root: PathBuf,
}

impl PipelineExecutor {
  pub fn new(config: Config, tofdata_root: PathBuf) -> Self {
    Self { config, tofdata_root }
  }

  fn resolve_command(&self, key: &'static str) -> Result<PathBuf, PipelineError> {
    self
      .config
      .get_absolute_path("pipeline", key)
      .map_err(|_| PipelineError::MissingCommand(key))
  }

  /// Run a `PROCESS_*_CALIBRATION` step and publish the result (spec.md
  /// §4.9c, §8 property 8: the canonical symlink must resolve to the
  /// newest eligible input's output once this returns `true`).
  pub fn process(&self, kind: ProcessKind, args: &ProcessArgs) -> bool {
    match self.try_process(kind, args) {
      Ok(success) => success,
      Err(e) => {
        error!(event = "pipeline_process_failed", kind = kind.dir_prefix(), error = %e, "process pipeline failed");
        false
      }
    }
  }

  fn try_process(&self, kind: ProcessKind, args: &ProcessArgs) -> Result<bool, PipelineError> {
    let input_dir = self.tofdata_root.join("hist");
    let ts = latest_timestamp(&input_dir, kind.dir_prefix(), "")
      .ok_or_else(|| PipelineError::NoInput(input_dir.clone(), kind.dir_prefix()))?;
    let input = file_path_with_timestamp(&input_dir, kind.dir_prefix(), &ts, "dat");

    let output_dir = self.tofdata_root.join(kind.dir_prefix());
    std::fs::create_dir_all(&output_dir)?;
    let output = file_path_with_timestamp(&output_dir, kind.dir_prefix(), &ts, "dat");

    let program = self.resolve_command(kind.pipeline_config_key())?;
    info!(event = "pipeline_process_start", kind = kind.dir_prefix(), ts, "running process pipeline");
    let status = Command::new(&program)
      .arg(&input)
      .arg(&output)
      .arg(args.do_sorting.to_string())
      .arg(args.keep_tmp.to_string())
      .arg(args.nominal_m.to_string())
      .status()?;

    if !status.success() {
      warn!(event = "pipeline_process_exit_failure", kind = kind.dir_prefix(), "pipeline command exited with failure");
      return Ok(false);
    }

    let canonical = match self.config.get_absolute_path("main", kind.canonical_key()) {
      Ok(p) => p,
      Err(e) => {
        warn!(event = "pipeline_publish_skipped", kind = kind.dir_prefix(), error = %e, "no canonical path configured; skipping publish");
        return Ok(true);
      }
    };
    copy_or_link(&output, &canonical, true)?;
    info!(event = "pipeline_published", kind = kind.dir_prefix(), canonical = %canonical.display(), "published calibration");
    Ok(true)
  }

  /// Run `CONVERT_RAW_TO_RAW`/`CONVERT_RAW_TO_SINGLES` (spec.md §6). No
  /// publish step: conversions are not `PROCESS_*_CALIBRATION`.
  pub fn convert(&self, kind: ConvertKind, args: &ConvertArgs) -> bool {
    match self.try_convert(kind, args) {
      Ok(success) => success,
      Err(e) => {
        error!(event = "pipeline_convert_failed", error = %e, "convert pipeline failed");
        false
      }
    }
  }

  fn try_convert(&self, kind: ConvertKind, args: &ConvertArgs) -> Result<bool, PipelineError> {
    let input_dir = self.tofdata_root.join("stg0");
    let ts = latest_timestamp(&input_dir, "stg0", "")
      .ok_or_else(|| PipelineError::NoInput(input_dir.clone(), "stg0"))?;
    let input = file_path_with_timestamp(&input_dir, "stg0", &ts, "dat");

    let output_dir = self.tofdata_root.join("stg1");
    std::fs::create_dir_all(&output_dir)?;
    let output = file_path_with_timestamp(&output_dir, "stg1", &ts, "dat");

    let program = self.resolve_command(kind.pipeline_config_key())?;
    let mut cmd = Command::new(&program);
    cmd.arg(&input).arg(&output);
    if let Some(file_type) = args.file_type {
      cmd.arg(file_type.to_string());
    }
    cmd.arg(args.event_fraction.to_string());
    cmd.arg(args.split_time.to_string());

    let status = cmd.status()?;
    Ok(status.success())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn config_with(pairs: &[(&str, &str, &str)]) -> (tempfile::TempDir, Config) {
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
    let config = crate::config::load(&config_path).unwrap();
    (td, config)
  }

  #[test]
  fn process_publishes_latest_input_to_canonical_symlink() {
    let (td, config) = config_with(&[
      ("pipeline", "process_threshold_calibration", "/bin/true"),
      ("main", "disc_calibration_table", "canonical/disc.dat"),
    ]);
    let tofdata = td.path().join("tofdata");
    std::fs::create_dir_all(tofdata.join("hist")).unwrap();
    std::fs::write(tofdata.join("hist/disc_2026-07-26_12-00-00.000Z.dat"), b"x").unwrap();

    let executor = PipelineExecutor::new(config, tofdata.clone());
    let ok = executor.process(
      ProcessKind::Threshold,
      &ProcessArgs {
        do_sorting: true,
        keep_tmp: false,
        nominal_m: 5,
      },
    );
    assert!(ok);

    let canonical = td.path().join("canonical/disc.dat");
    assert!(canonical.symlink_metadata().is_ok());
  }

  #[test]
  fn process_without_input_fails_without_running_command() {
    let (td, config) = config_with(&[("pipeline", "process_threshold_calibration", "/bin/true")]);
    let tofdata = td.path().join("tofdata");
    std::fs::create_dir_all(&tofdata).unwrap();

    let executor = PipelineExecutor::new(config, tofdata);
    let ok = executor.process(
      ProcessKind::Threshold,
      &ProcessArgs {
        do_sorting: false,
        keep_tmp: false,
        nominal_m: 0,
      },
    );
    assert!(!ok);
  }

  #[test]
  fn failing_pipeline_command_does_not_publish() {
    let (td, config) = config_with(&[
      ("pipeline", "process_threshold_calibration", "/bin/false"),
      ("main", "disc_calibration_table", "canonical/disc.dat"),
    ]);
    let tofdata = td.path().join("tofdata");
    std::fs::create_dir_all(tofdata.join("hist")).unwrap();
    std::fs::write(tofdata.join("hist/disc_2026-07-26_12-00-00.000Z.dat"), b"x").unwrap();

    let executor = PipelineExecutor::new(config, tofdata.clone());
    let ok = executor.process(
      ProcessKind::Threshold,
      &ProcessArgs {
        do_sorting: false,
        keep_tmp: false,
        nominal_m: 0,
      },
    );
    assert!(!ok);
    assert!(!td.path().join("canonical/disc.dat").exists());
  }
}
