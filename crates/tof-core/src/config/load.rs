use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::substitute::substitute;
use super::types::{Config, Result};
use super::validate::validate;

/// Load configuration from an INI-style file: `[section]` headers, `key =
/// value` lines, `;`/`#` comments. Values undergo one pass of variable
/// substitution (spec.md §4.3) resolved against the file's parent directory.
pub fn load(path: &Path) -> Result<Config> {
  let raw = fs::read_to_string(path)?;
  let config_dir = path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| Path::new(".").to_path_buf());

  let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
  let mut current = String::from("");

  for line in raw.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
      continue;
    }
    if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
      current = name.trim().to_string();
      sections.entry(current.clone()).or_default();
      continue;
    }
    if let Some((key, value)) = line.split_once('=') {
      let key = key.trim().to_string();
      let value = substitute(value.trim(), &config_dir)?;
      sections.entry(current.clone()).or_default().insert(key, value);
    }
  }

  let config = Config {
    sections,
    config_dir,
  };
  validate(&config)?;
  Ok(config)
}
