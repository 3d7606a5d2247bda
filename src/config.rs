//! Engine configuration, read from `config.json` next to the database.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fields::NestingPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Whether subtasks may nest below the first level.
    pub nesting: NestingPolicy,
    /// Also enforce the 100-unit sibling budget on weight edits and reparenting,
    /// not only when a child is created.
    pub strict_weight_budget: bool,
    /// JSON-lines file receiving notifications. Logged only when unset.
    pub outbox: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl EngineConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.nesting, NestingPolicy::MultiLevel);
        assert!(!config.strict_weight_budget);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "nesting": "single-level", "outbox": "notes.jsonl" }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.nesting, NestingPolicy::SingleLevel);
        assert_eq!(config.outbox, Some(PathBuf::from("notes.jsonl")));
        assert!(!config.strict_weight_budget);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nesting: ").unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
