use std::path::Path;

use serde::{Deserialize, Serialize};

use keel_retry::RetryOptions;
use keel_snapshot::SnapshotConfig;

use crate::error::{EngineError, EngineResult};

/// Engine configuration, loadable from a TOML file.
///
/// Every section has defaults, so a missing or empty file yields a working
/// configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recorded as the author of every checkpoint commit.
    pub author: AuthorConfig,
    /// Directory-capture tuning (ignore patterns, size limits).
    pub snapshot: SnapshotConfig,
    /// Backoff tuning for retried storage operations.
    pub retry: RetryOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorConfig {
    pub name: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: "keel".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. A missing file is not an
    /// error; defaults apply.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.author.name, "keel");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(
            &path,
            "[author]\nname = \"ci-bot\"\n\n[snapshot]\nignore_patterns = [\"target\"]\n",
        )
        .unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.author.name, "ci-bot");
        assert_eq!(config.snapshot.ignore_patterns, vec!["target"]);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "author = [not toml").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::Config(_))
        ));
    }
}
