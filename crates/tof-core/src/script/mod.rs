//! Script Executor (C8, spec.md §4.8): "invoke a named routine with a typed
//! argument tuple", resolved to an external command and run out-of-process.
//! Grounded on the teacher's agent runner
//! (`agency-core::agent::runner::{resolve_action, build_env,
//! substitute_tokens}`): a config-resolved command plus args, with
//! environment-variable token substitution, executed via
//! `std::process::Command`. Routine *internals* (what the script itself
//! does) are a Non-goal; only the invocation boundary is in scope.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;

/// The fixed routine catalog (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Routine {
  InitSystem,
  MakeBiasCalibrationTable,
  MakeSimpleBiasSettingsTable,
  MakeSimpleChannelMap,
  MakeSimpleDiscSettingsTable,
  ReadTemperatureSensors,
  AcquireThresholdCalibration(ThresholdMode),
  AcquireQdcCalibration,
  AcquireTdcCalibration,
  AcquireSipmData,
}

/// `ACQUIRE_THRESHOLD_CALIBRATION` has three wire codes distinguished only
/// by mode (spec.md §6 0x5106/0x5110/0x5111).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdMode {
  All,
  BaselineNoise,
  Dark,
}

impl Routine {
  /// The config key this routine's command is resolved under (`[scripts]`
  /// section, matching the teacher's `config.agents.get(key)` lookup).
  fn config_key(self) -> &'static str {
    match self {
      Routine::InitSystem => "init_system",
      Routine::MakeBiasCalibrationTable => "make_bias_calibration_table",
      Routine::MakeSimpleBiasSettingsTable => "make_simple_bias_settings_table",
      Routine::MakeSimpleChannelMap => "make_simple_channel_map",
      Routine::MakeSimpleDiscSettingsTable => "make_simple_disc_settings_table",
      Routine::ReadTemperatureSensors => "read_temperature_sensors",
      Routine::AcquireThresholdCalibration(ThresholdMode::All) => "acquire_threshold_calibration",
      Routine::AcquireThresholdCalibration(ThresholdMode::BaselineNoise) => {
        "acquire_threshold_calibration_bn"
      }
      Routine::AcquireThresholdCalibration(ThresholdMode::Dark) => "acquire_threshold_calibration_d",
      Routine::AcquireQdcCalibration => "acquire_qdc_calibration",
      Routine::AcquireTdcCalibration => "acquire_tdc_calibration",
      Routine::AcquireSipmData => "acquire_sipm_data",
    }
  }

  pub fn name(self) -> &'static str {
    self.config_key()
  }
}

#[derive(Debug, Error)]
pub enum ScriptError {
  #[error("routine `{0}` has no command configured under [scripts]")]
  MissingCommand(&'static str),
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

/// Resolves and runs routines against the `[scripts]` config section,
/// rooted at a script directory (spec.md §4.8 "resolved relative to a
/// script root, environment-configured").
pub struct ScriptExecutor {
  script_root: PathBuf,
  config: Config,
}

impl ScriptExecutor {
  pub fn new(config: Config, script_root: PathBuf) -> Self {
    Self { script_root, config }
  }

  fn resolve_command(&self, routine: Routine) -> Result<PathBuf, ScriptError> {
    let raw = self
      .config
      .get_string("scripts", routine.config_key())
      .map_err(|_| ScriptError::MissingCommand(routine.config_key()))?;
    let path = PathBuf::from(raw);
    Ok(if path.is_absolute() {
      path
    } else {
      self.script_root.join(path)
    })
  }

  /// Run `routine` with `args`, substituting `$VAR` tokens against `env`
  /// (teacher's `substitute_tokens`). Contract: never propagates an error —
  /// uncaught failures become `false`, logged with the routine name
  /// (spec.md §4.8 Contract).
  pub fn run(&self, routine: Routine, args: &[String], env: &HashMap<String, String>) -> bool {
    match self.try_run(routine, args, env) {
      Ok(success) => success,
      Err(e) => {
        error!(event = "script_routine_failed", routine = routine.name(), error = %e, "routine invocation failed");
        false
      }
    }
  }

  fn try_run(
    &self,
    routine: Routine,
    args: &[String],
    env: &HashMap<String, String>,
  ) -> Result<bool, ScriptError> {
    let program = self.resolve_command(routine)?;
    let substituted = substitute_tokens(args, env);

    info!(event = "script_routine_start", routine = routine.name(), program = %program.display(), "invoking routine");
    let status = Command::new(&program).args(&substituted).envs(env).status()?;

    let success = status.success();
    info!(event = "script_routine_done", routine = routine.name(), success, "routine finished");
    Ok(success)
  }
}

/// Replace `$KEY` tokens in each argument with `env["KEY"]` (teacher's
/// `agent::runner::substitute_tokens`).
pub fn substitute_tokens(args: &[String], env: &HashMap<String, String>) -> Vec<String> {
  args
    .iter()
    .map(|arg| {
      let mut substituted = arg.clone();
      for (key, value) in env {
        let token = format!("${key}");
        if substituted.contains(&token) {
          substituted = substituted.replace(&token, value);
        }
      }
      substituted
    })
    .collect()
}

/// Build the routine's environment (teacher's `agent::runner::build_env`):
/// data root, config directory, and debug flag.
pub fn build_env(tofdata: &Path, config_dir: &Path, debug: bool) -> HashMap<String, String> {
  let mut env = HashMap::new();
  env.insert("TOFDATA".to_string(), tofdata.to_string_lossy().into_owned());
  env.insert("CDIR".to_string(), config_dir.to_string_lossy().into_owned());
  env.insert("DEBUG".to_string(), if debug { "1" } else { "0" }.to_string());
  env
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn config_with_script(key: &str, program: &Path) -> Config {
    let td = tempfile::tempdir().unwrap();
    let config_path = td.path().join("tof.cfg");
    let mut f = std::fs::File::create(&config_path).unwrap();
    writeln!(f, "[scripts]").unwrap();
    writeln!(f, "{key} = {}", program.display()).unwrap();
    drop(f);
    std::mem::forget(td); // keep the tempdir alive for the config's lifetime
    crate::config::load(&config_path).unwrap()
  }

  #[test]
  fn substitute_tokens_replaces_dollar_vars() {
    let mut env = HashMap::new();
    env.insert("TOFDATA".to_string(), "/data/tof".to_string());
    let args = vec!["--out".to_string(), "$TOFDATA/disc".to_string()];
    assert_eq!(substitute_tokens(&args, &env), vec!["--out", "/data/tof/disc"]);
  }

  #[test]
  fn missing_command_is_reported_as_failure_not_panic() {
    let td = tempfile::tempdir().unwrap();
    let config_path = td.path().join("tof.cfg");
    std::fs::write(&config_path, "[scripts]\n").unwrap();
    let config = crate::config::load(&config_path).unwrap();
    let executor = ScriptExecutor::new(config, td.path().to_path_buf());
    let ok = executor.run(Routine::InitSystem, &[], &HashMap::new());
    assert!(!ok);
  }

  #[test]
  fn successful_routine_returns_true() {
    let program = if cfg!(target_os = "windows") {
      PathBuf::from("cmd")
    } else {
      PathBuf::from("/bin/true")
    };
    let config = config_with_script("init_system", &program);
    let executor = ScriptExecutor::new(config, PathBuf::from("/"));
    let ok = executor.run(Routine::InitSystem, &[], &HashMap::new());
    assert!(ok);
  }

  #[test]
  fn failing_routine_returns_false() {
    let config = config_with_script("init_system", Path::new("/bin/false"));
    let executor = ScriptExecutor::new(config, PathBuf::from("/"));
    let ok = executor.run(Routine::InitSystem, &[], &HashMap::new());
    assert!(!ok);
  }
}
