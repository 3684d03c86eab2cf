//! Timestamp and publication helpers (spec.md §4.3, §6). Filenames follow
//! the convention `<prefix>_<timestamp>[<suffix>].<ext>`; the "latest
//! timestamp" scan backs the `PROCESS_*_CALIBRATION` publish step (spec.md
//! §4.9, §8 property 8), grounded on how `agency-core::daemon::task_index`
//! scans a directory for the highest existing id.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestampError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("no file matching prefix `{prefix}` found under {dir}", dir = dir.display())]
  NotFound { dir: PathBuf, prefix: String },
  #[error("source path does not exist: {0}", .0.display())]
  MissingSource(PathBuf),
}

/// `YYYY-MM-DD_HH-MM-SS.mmmZ` in UTC.
pub fn current_timestamp() -> String {
  Utc::now().format("%Y-%m-%d_%H-%M-%S%.3fZ").to_string()
}

/// Scan `dir` for names matching `prefix_<ts>[suffix].*` and return the
/// lexicographically greatest `<ts>` found (our timestamp format sorts
/// chronologically under lexicographic order).
pub fn latest_timestamp(dir: &Path, prefix: &str, suffix: &str) -> Option<String> {
  let entries = fs::read_dir(dir).ok()?;
  let needle = format!("{prefix}_");
  let mut best: Option<String> = None;

  for entry in entries.flatten() {
    let name = entry.file_name();
    let name = name.to_string_lossy();
    let Some(rest) = name.strip_prefix(&needle) else {
      continue;
    };
    let Some((before_ext, _ext)) = rest.rsplit_once('.') else {
      continue;
    };
    let ts = if suffix.is_empty() {
      before_ext
    } else {
      match before_ext.strip_suffix(suffix) {
        Some(ts) => ts,
        None => continue,
      }
    };
    if best.as_deref().is_none_or(|b| ts > b) {
      best = Some(ts.to_string());
    }
  }

  best
}

/// Build `dir/<prefix>_<ts>.<ext>`.
pub fn file_path_with_timestamp(dir: &Path, prefix: &str, ts: &str, ext: &str) -> PathBuf {
  dir.join(format!("{prefix}_{ts}.{ext}"))
}

/// Resolve the concrete filename for `prefix_<ts><suffix>.*` under `dir`.
pub fn file_by_timestamp(
  dir: &Path,
  prefix: &str,
  ts: &str,
  suffix: &str,
) -> Result<PathBuf, TimestampError> {
  let wanted = format!("{prefix}_{ts}{suffix}");
  for entry in fs::read_dir(dir)?.flatten() {
    let name = entry.file_name();
    let name = name.to_string_lossy();
    if let Some((before_ext, _ext)) = name.rsplit_once('.')
      && before_ext == wanted
    {
      return Ok(entry.path());
    }
  }
  Err(TimestampError::NotFound {
    dir: dir.to_path_buf(),
    prefix: prefix.to_string(),
  })
}

/// Replace `dst` if it exists, then either symlink or copy `src` onto it
/// (spec.md §4.3 `copyOrLink`) — the "publish" step for calibration
/// artifacts (spec.md §6, §8 property 8).
pub fn copy_or_link(src: &Path, dst: &Path, as_symlink: bool) -> Result<(), TimestampError> {
  if !src.exists() {
    return Err(TimestampError::MissingSource(src.to_path_buf()));
  }
  if dst.exists() || dst.symlink_metadata().is_ok() {
    fs::remove_file(dst)?;
  }
  if as_symlink {
    std::os::unix::fs::symlink(src, dst)?;
  } else {
    fs::copy(src, dst)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs::File;

  #[test]
  fn current_timestamp_has_expected_shape() {
    let ts = current_timestamp();
    // 2026-07-26_12-00-00.000Z
    assert_eq!(ts.len(), 24);
    assert!(ts.ends_with('Z'));
    assert_eq!(ts.chars().nth(10), Some('_'));
  }

  #[test]
  fn latest_timestamp_picks_greatest() {
    let td = tempfile::tempdir().unwrap();
    for name in [
      "disc_2026-01-01_00-00-00.000Z.dat",
      "disc_2026-07-26_12-00-00.000Z.dat",
      "disc_2026-03-15_08-30-00.000Z.dat",
      "hist_2026-12-31_00-00-00.000Z.dat",
    ] {
      File::create(td.path().join(name)).unwrap();
    }
    let got = latest_timestamp(td.path(), "disc", "").unwrap();
    assert_eq!(got, "2026-07-26_12-00-00.000Z");
  }

  #[test]
  fn latest_timestamp_honors_suffix() {
    let td = tempfile::tempdir().unwrap();
    for name in [
      "disc_2026-01-01_00-00-00.000Z_raw.dat",
      "disc_2026-07-26_12-00-00.000Z_raw.dat",
      "disc_2026-09-01_00-00-00.000Z.dat", // no suffix, must be excluded
    ] {
      File::create(td.path().join(name)).unwrap();
    }
    let got = latest_timestamp(td.path(), "disc", "_raw").unwrap();
    assert_eq!(got, "2026-07-26_12-00-00.000Z");
  }

  #[test]
  fn latest_timestamp_none_when_empty() {
    let td = tempfile::tempdir().unwrap();
    assert!(latest_timestamp(td.path(), "disc", "").is_none());
  }

  #[test]
  fn file_path_with_timestamp_builds_expected_name() {
    let dir = Path::new("/tmp/tofdata/disc");
    let got = file_path_with_timestamp(dir, "disc", "2026-07-26_12-00-00.000Z", "dat");
    assert_eq!(got, dir.join("disc_2026-07-26_12-00-00.000Z.dat"));
  }

  #[test]
  fn file_by_timestamp_resolves_existing_file() {
    let td = tempfile::tempdir().unwrap();
    File::create(td.path().join("disc_2026-07-26_12-00-00.000Z.dat")).unwrap();
    let got = file_by_timestamp(td.path(), "disc", "2026-07-26_12-00-00.000Z", "").unwrap();
    assert_eq!(got, td.path().join("disc_2026-07-26_12-00-00.000Z.dat"));
  }

  #[test]
  fn copy_or_link_replaces_existing_destination() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src.dat");
    let dst = td.path().join("link");
    fs::write(&src, b"data").unwrap();
    fs::write(&dst, b"stale").unwrap();

    copy_or_link(&src, &dst, false).unwrap();
    assert_eq!(fs::read(&dst).unwrap(), b"data");
  }

  #[test]
  fn copy_or_link_as_symlink() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src.dat");
    let dst = td.path().join("link");
    fs::write(&src, b"data").unwrap();

    copy_or_link(&src, &dst, true).unwrap();
    assert!(
      dst.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
    );
    assert_eq!(fs::read(&dst).unwrap(), b"data");
  }

  #[test]
  fn copy_or_link_fails_when_source_missing() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("missing.dat");
    let dst = td.path().join("link");
    assert!(matches!(
      copy_or_link(&src, &dst, false),
      Err(TimestampError::MissingSource(_))
    ));
  }
}
