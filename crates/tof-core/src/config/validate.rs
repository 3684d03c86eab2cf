use super::types::{Config, ConfigError, Result};

/// Reject keys declared before any `[section]` header — the original
/// `INIReader`-backed loader ties those to an implicit default section,
/// which this core never reads from, so treat it as a load error instead
/// of a silently-ignored key.
pub(super) fn validate(config: &Config) -> Result<()> {
  if let Some(default_section) = config.sections.get("")
    && !default_section.is_empty()
  {
    let key = default_section.keys().next().cloned().unwrap_or_default();
    return Err(ConfigError::MissingSection {
      section: format!("(key `{key}` declared before any [section] header)"),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::load;
  use std::io::Write;

  #[test]
  fn rejects_keys_before_first_section() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("c.ini");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"stray = 1\n[main]\nok = 2\n").unwrap();
    assert!(load(&path).is_err());
  }
}
