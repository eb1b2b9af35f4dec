//! llama.cpp command-line backend
//!
//! Each inference is one run of a `llama-cli` style executable. Stdout is the
//! generated text; bytes that are not valid UTF-8 are replaced with U+FFFD.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::backend::{InferenceBackend, InferenceError};

/// Settings for [`LlamaCliBackend`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlamaCliConfig {
    /// Executable to run
    pub binary: PathBuf,
    /// Model file passed as `--model`
    pub model: PathBuf,
    /// Context window passed as `--ctx-size`
    pub ctx_size: u32,
    /// Generation limit passed as `--n_predict`
    pub n_predict: u32,
    /// Per-call timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for LlamaCliConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("llama-cli"),
            model: PathBuf::from("model.gguf"),
            ctx_size: 1028,
            n_predict: 100,
            timeout_secs: None,
        }
    }
}

/// Backend that shells out to a local llama.cpp executable
#[derive(Debug, Clone)]
pub struct LlamaCliBackend {
    config: LlamaCliConfig,
}

impl LlamaCliBackend {
    pub fn new(config: LlamaCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LlamaCliConfig {
        &self.config
    }

    /// Arguments for one invocation with `prompt`
    pub fn command_args(&self, prompt: &str) -> Vec<OsString> {
        vec![
            "--model".into(),
            self.config.model.clone().into_os_string(),
            "--prompt".into(),
            prompt.into(),
            "--ctx-size".into(),
            self.config.ctx_size.to_string().into(),
            "--n_predict".into(),
            self.config.n_predict.to_string().into(),
        ]
    }
}

#[async_trait]
impl InferenceBackend for LlamaCliBackend {
    #[instrument(skip(self, prompt), fields(binary = %self.config.binary.display(), prompt_len = prompt.len()))]
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.command_args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_err = |source: std::io::Error| InferenceError::Spawn {
            binary: self.config.binary.display().to_string(),
            source,
        };

        let output = match self.config.timeout_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                tokio::time::timeout(limit, cmd.output())
                    .await
                    .map_err(|_| InferenceError::Timeout(limit))?
                    .map_err(spawn_err)?
            }
            None => cmd.output().await.map_err(spawn_err)?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(code = ?output.status.code(), "Inference process failed");
            return Err(InferenceError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = output.stdout.len(), "Inference complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(binary: &str) -> LlamaCliBackend {
        LlamaCliBackend::new(LlamaCliConfig {
            binary: PathBuf::from(binary),
            ..Default::default()
        })
    }

    #[test]
    fn test_default_limits() {
        let config = LlamaCliConfig::default();
        assert_eq!(config.ctx_size, 1028);
        assert_eq!(config.n_predict, 100);
        assert!(config.timeout_secs.is_none());
    }

    #[test]
    fn test_command_args() {
        let backend = LlamaCliBackend::new(LlamaCliConfig {
            model: PathBuf::from("/models/qwen.gguf"),
            ..Default::default()
        });

        let args = backend.command_args("Summarize: topic");
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--model", "/models/qwen.gguf",
                "--prompt", "Summarize: topic",
                "--ctx-size", "1028",
                "--n_predict", "100",
            ]
        );
    }

    #[test]
    fn test_config_partial_toml() {
        let config: LlamaCliConfig = toml::from_str("n_predict = 256\ntimeout_secs = 30").unwrap();
        assert_eq!(config.n_predict, 256);
        assert_eq!(config.ctx_size, 1028);
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_binary_returns_stdout() {
        let output = backend_with("echo").infer("hello").await.unwrap();
        assert!(output.contains("--prompt hello"));
        assert!(output.ends_with('\n'));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let err = backend_with("false").infer("hello").await.unwrap_err();
        assert!(matches!(err, InferenceError::Exit { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = backend_with("/nonexistent/llama-cli").infer("hello").await.unwrap_err();
        assert!(matches!(err, InferenceError::Spawn { .. }));
    }
}
