//! Structured logging init, grounded on `agency-core::logging::init`: a
//! non-blocking JSON file writer sized by a configured level. New relative
//! to the teacher (spec.md §6 CLI surface, `--log-file`): operators running
//! this core in the foreground, or passing `--log-file -`, get a stderr
//! layer instead of a file writer, since this core is a long-running
//! service rather than a one-shot CLI.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::OnceLock;

use tracing::{info, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

static WORKER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Off,
  Warn,
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  fn as_filter(self) -> &'static str {
    match self {
      LogLevel::Off => "off",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    Some(match raw.to_ascii_lowercase().as_str() {
      "off" => LogLevel::Off,
      "warn" => LogLevel::Warn,
      "info" => LogLevel::Info,
      "debug" => LogLevel::Debug,
      "trace" => LogLevel::Trace,
      _ => return None,
    })
  }
}

/// Where log lines go: a JSON-lines file, or stderr for foreground runs
/// (spec.md §6 `--log-file -`).
pub enum LogTarget<'a> {
  File(&'a Path),
  Stderr,
}

/// Initialize structured JSON logging. Idempotent in practice: a second
/// call's `set_global_default` error is ignored, matching the teacher.
pub fn init(target: LogTarget<'_>, level: LogLevel) {
  let filter = EnvFilter::new(level.as_filter());

  match target {
    LogTarget::File(path) => {
      if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
      }
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log file for append");

      let (nb_writer, guard) = tracing_appender::non_blocking(file);
      let _ = WORKER_GUARD.set(guard);

      let json_layer = fmt::layer()
        .with_timer(ChronoUtc::rfc_3339())
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_level(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(move || nb_writer.clone());

      let subscriber = Registry::default().with(filter).with(json_layer);
      let _ = set_global_default(subscriber);

      info!(event = "logging_initialized", log_file = %path.display(), "logging initialized");
    }
    LogTarget::Stderr => {
      let stderr_layer = fmt::layer()
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr)
        .with_target(false);

      let subscriber = Registry::default().with(filter).with(stderr_layer);
      let _ = set_global_default(subscriber);

      info!(event = "logging_initialized", target = "stderr", "logging initialized");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;
  use std::{fs, thread, time::Duration};
  use tracing::info;

  #[test]
  fn writes_json_logs_to_file() {
    let td = tempfile::tempdir().unwrap();
    let log = td.path().join("logs.jsonl");

    init(LogTarget::File(&log), LogLevel::Info);
    info!(answer = 42, "hello from tof-core");

    thread::sleep(Duration::from_millis(50));

    let s = fs::read_to_string(&log).expect("read logs");
    assert!(s.lines().count() >= 1, "no log lines written");

    let mut saw_event = false;
    for line in s.lines() {
      if let Ok(v) = serde_json::from_str::<Value>(line)
        && v.get("fields").and_then(|f| f.get("message")).and_then(|m| m.as_str())
          == Some("hello from tof-core")
      {
        saw_event = true;
      }
    }
    assert!(saw_event, "missing expected log line");
  }

  #[test]
  fn log_level_parses_known_names_case_insensitively() {
    assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
    assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warn));
    assert_eq!(LogLevel::parse("bogus"), None);
  }
}
