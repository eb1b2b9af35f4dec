//! Configuration file support

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::ExecutionMode;
use crate::error::SynodError;
use crate::llama::LlamaCliConfig;
use crate::topology::DEFAULT_TOPOLOGY_FILE;

/// Top-level configuration, usually read from `synod.toml`
///
/// ```toml
/// topology_path = "agent_config.json"
/// mode = "sequential"
///
/// [backend]
/// binary = "/usr/local/bin/llama-cli"
/// model = "/models/Llama-3.2-1B-Instruct-Q4_K_M.gguf"
/// ctx_size = 1028
/// n_predict = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynodConfig {
    pub backend: LlamaCliConfig,
    pub topology_path: PathBuf,
    pub mode: ExecutionMode,
}

impl Default for SynodConfig {
    fn default() -> Self {
        Self {
            backend: LlamaCliConfig::default(),
            topology_path: PathBuf::from(DEFAULT_TOPOLOGY_FILE),
            mode: ExecutionMode::Sequential,
        }
    }
}

impl SynodConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, SynodError> {
        toml::from_str(text).map_err(|e| SynodError::Config(e.to_string()))
    }

    /// Read configuration from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SynodError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| SynodError::Config(format!("{}: {e}", path.display())))
    }

    /// Read `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SynodError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SynodConfig::default();
        assert_eq!(config.topology_path, PathBuf::from("agent_config.json"));
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.backend.n_predict, 100);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SynodConfig::from_toml("").unwrap(), SynodConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = SynodConfig::from_toml(
            r#"
            mode = "concurrent"

            [backend]
            model = "/models/tiny.gguf"
            timeout_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert_eq!(config.backend.model, PathBuf::from("/models/tiny.gguf"));
        assert_eq!(config.backend.timeout_secs, Some(60));
        assert_eq!(config.backend.ctx_size, 1028);
        assert_eq!(config.topology_path, PathBuf::from(DEFAULT_TOPOLOGY_FILE));
    }

    #[test]
    fn test_invalid_mode() {
        let err = SynodConfig::from_toml(r#"mode = "parallel""#).unwrap_err();
        assert!(matches!(err, SynodError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synod.toml");
        fs::write(&path, "topology_path = \"teams/review.json\"\n").unwrap();

        let config = SynodConfig::load_or_default(Some(path.as_path())).unwrap();
        assert_eq!(config.topology_path, PathBuf::from("teams/review.json"));
        assert_eq!(SynodConfig::load_or_default(None).unwrap(), SynodConfig::default());
    }
}
