use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("missing section `{section}`")]
  MissingSection { section: String },
  #[error("missing key `{section}.{key}`")]
  MissingKey { section: String, key: String },
  #[error("key `{section}.{key}` is not a valid integer: {value}")]
  NotAnInt {
    section: String,
    key: String,
    value: String,
  },
  #[error("key `{section}.{key}` is not a valid float: {value}")]
  NotAFloat {
    section: String,
    key: String,
    value: String,
  },
  #[error("`$TOFDATA` must be set in the environment to load configuration")]
  TofdataUnset,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The Config Store (spec.md §3 ConfigValue, §4.3). Keyed by
/// `(section, key)`, values already substituted on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
  pub(super) sections: BTreeMap<String, BTreeMap<String, String>>,
  pub(super) config_dir: PathBuf,
}

impl Config {
  pub fn config_dir(&self) -> &Path {
    &self.config_dir
  }

  fn section(&self, section: &str) -> Result<&BTreeMap<String, String>> {
    self
      .sections
      .get(section)
      .ok_or_else(|| ConfigError::MissingSection {
        section: section.to_string(),
      })
  }

  pub fn get_string(&self, section: &str, key: &str) -> Result<String> {
    let map = self.section(section)?;
    map
      .get(key)
      .cloned()
      .ok_or_else(|| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
      })
  }

  pub fn get_int(&self, section: &str, key: &str) -> Result<i64> {
    let value = self.get_string(section, key)?;
    value
      .trim()
      .parse()
      .map_err(|_| ConfigError::NotAnInt {
        section: section.to_string(),
        key: key.to_string(),
        value,
      })
  }

  pub fn get_double(&self, section: &str, key: &str) -> Result<f64> {
    let value = self.get_string(section, key)?;
    value
      .trim()
      .parse()
      .map_err(|_| ConfigError::NotAFloat {
        section: section.to_string(),
        key: key.to_string(),
        value,
      })
  }

  /// Resolve a (possibly relative) path value against the config's
  /// directory, the way `%CDIR%`-relative values are meant to be used.
  pub fn get_absolute_path(&self, section: &str, key: &str) -> Result<PathBuf> {
    let raw = self.get_string(section, key)?;
    let path = PathBuf::from(&raw);
    Ok(if path.is_absolute() {
      path
    } else {
      self.config_dir.join(path)
    })
  }

  /// The file stem (no directory, no extension) of a path-valued key.
  pub fn get_file_stem(&self, section: &str, key: &str) -> Result<String> {
    let raw = self.get_string(section, key)?;
    Ok(
      Path::new(&raw)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(raw),
    )
  }

  pub fn has(&self, section: &str, key: &str) -> bool {
    self
      .sections
      .get(section)
      .map(|m| m.contains_key(key))
      .unwrap_or(false)
  }
}
