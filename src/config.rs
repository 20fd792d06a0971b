//! Engine, cache and layering settings.
//!
//! Settings come from an optional JSON file; environment variables then
//! override individual fields:
//!
//! | variable | field |
//! |---|---|
//! | `ABC_ENGINE` | `engine` (`ogawa` / `legacy`) |
//! | `ABC_DEDUP` | `dedup` (`1`/`0`, `true`/`false`) |
//! | `ABC_MMAP` | `mmap` |
//! | `ABC_CACHE_BYTES` | `cache_bytes` |
//! | `ABC_STRICT_LAYERS` | `strict_layers` |

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Engine, ReadOptions, WriteOptions};
use crate::layer::LayerOptions;
use crate::util::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Engine for new archives.
    pub engine: Engine,
    pub dedup: bool,
    pub mmap: bool,
    /// Array read-cache budget in bytes.
    pub cache_bytes: usize,
    pub strict_layers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let read = ReadOptions::default();
        let write = WriteOptions::default();
        Self {
            engine: write.engine,
            dedup: write.dedup,
            mmap: read.mmap,
            cache_bytes: read.cache_bytes,
            strict_layers: false,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::other(format!("{name}: expected a boolean, got '{value}'"))),
    }
}

impl Settings {
    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Override fields from `lookup`, which stands in for the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ABC_ENGINE") {
            self.engine = v.parse()?;
        }
        if let Some(v) = lookup("ABC_DEDUP") {
            self.dedup = parse_bool("ABC_DEDUP", &v)?;
        }
        if let Some(v) = lookup("ABC_MMAP") {
            self.mmap = parse_bool("ABC_MMAP", &v)?;
        }
        if let Some(v) = lookup("ABC_CACHE_BYTES") {
            self.cache_bytes = v
                .trim()
                .parse()
                .map_err(|_| Error::other(format!("ABC_CACHE_BYTES: not a byte count: '{v}'")))?;
        }
        if let Some(v) = lookup("ABC_STRICT_LAYERS") {
            self.strict_layers = parse_bool("ABC_STRICT_LAYERS", &v)?;
        }
        Ok(())
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            engine: self.engine,
            dedup: self.dedup,
        }
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            mmap: self.mmap,
            cache_bytes: self.cache_bytes,
        }
    }

    pub fn layer_options(&self) -> LayerOptions {
        LayerOptions {
            strict: self.strict_layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"engine":"legacy"}"#).unwrap();
        assert_eq!(settings.engine, Engine::Legacy);
        assert!(settings.dedup);
        assert_eq!(settings.cache_bytes, ReadOptions::default().cache_bytes);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ABC_ENGINE", "legacy"),
            ("ABC_DEDUP", "0"),
            ("ABC_CACHE_BYTES", "1024"),
            ("ABC_STRICT_LAYERS", "true"),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();
        settings
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.write_options(), WriteOptions { engine: Engine::Legacy, dedup: false });
        assert_eq!(settings.read_options().cache_bytes, 1024);
        assert!(settings.layer_options().strict);
    }

    #[test]
    fn test_bad_env_value() {
        let mut settings = Settings::default();
        assert!(settings.apply_env(|k| (k == "ABC_DEDUP").then(|| "maybe".to_string())).is_err());
        assert!(settings.apply_env(|k| (k == "ABC_ENGINE").then(|| "zip".to_string())).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            engine: Engine::Legacy,
            strict_layers: true,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::from_file(&path).unwrap(), settings);
    }
}
