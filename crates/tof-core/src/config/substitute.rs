use std::path::Path;

use super::types::{ConfigError, Result};

/// One pass of variable substitution over a raw INI value (spec.md §3, §4.3),
/// grounded on `GRAMS_TOF_Config::substituteVariables` plus the `$TOFDATA`
/// requirement spec.md adds on top of it.
pub(super) fn substitute(raw: &str, config_dir: &Path) -> Result<String> {
  let mut result = raw.to_string();

  if let Some(pos) = result.find("%CDIR%") {
    result.replace_range(pos..pos + "%CDIR%".len(), &config_dir.to_string_lossy());
  }
  if let Some(pos) = result.find("%PWD%") {
    result.replace_range(pos..pos + "%PWD%".len(), ".");
  }
  if let Some(pos) = result.find("%HOME%")
    && let Ok(home) = std::env::var("HOME")
  {
    result.replace_range(pos..pos + "%HOME%".len(), &home);
  }
  if result.contains("$TOFDATA") {
    let tofdata = std::env::var("TOFDATA").map_err(|_| ConfigError::TofdataUnset)?;
    result = result.replace("$TOFDATA", &tofdata);
  }

  Ok(result)
}
