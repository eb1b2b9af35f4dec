//! Inference backend boundary
//!
//! The engine only ever sees `infer(prompt) -> text`. Anything that can turn
//! a prompt into generated text (a local llama.cpp binary, a remote API, a
//! scripted double) implements [`InferenceBackend`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Failure of a single inference call
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The backend process could not be started
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend process exited unsuccessfully
    #[error("Backend exited with {}: {stderr}", exit_status(.code))]
    Exit { code: Option<i32>, stderr: String },

    /// The call did not finish in time
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// A text-generation service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Generate text for `prompt`. The returned text is used verbatim.
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError>;
}

#[async_trait]
impl<T: InferenceBackend + ?Sized> InferenceBackend for Arc<T> {
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        (**self).infer(prompt).await
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String, InferenceError> + Send + Sync>;

/// In-process backend that records every prompt it receives
///
/// Answers come from a responder closure, so the same type serves dry runs
/// (`echo`) and failure injection (`failing_on`).
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    responder: Responder,
}

impl RecordingBackend {
    /// Create a backend answering with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Answer every prompt with `[prompt]`
    pub fn echo() -> Self {
        Self::new(|prompt| Ok(format!("[{prompt}]")))
    }

    /// Echo, except prompts containing `needle` fail
    pub fn failing_on(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(move |prompt| {
            if prompt.contains(&needle) {
                Err(InferenceError::Backend(format!("refused prompt containing {needle:?}")))
            } else {
                Ok(format!("[{prompt}]"))
            }
        })
    }

    /// Prompts received so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of prompts received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl InferenceBackend for RecordingBackend {
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        self.calls.lock().push(prompt.to_string());
        (self.responder)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_records_calls_in_order() {
        let backend = RecordingBackend::echo();

        assert_eq!(backend.infer("one").await.unwrap(), "[one]");
        assert_eq!(backend.infer("two").await.unwrap(), "[two]");

        assert_eq!(backend.calls(), vec!["one", "two"]);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_on_still_records() {
        let backend = RecordingBackend::failing_on("boom");

        assert!(backend.infer("fine").await.is_ok());
        let err = backend.infer("go boom").await.unwrap_err();
        assert!(matches!(err, InferenceError::Backend(_)));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_arc_delegates() {
        let backend = Arc::new(RecordingBackend::new(|_| Ok("fixed".into())));
        let shared: Arc<dyn InferenceBackend> = backend.clone();

        assert_eq!(shared.infer("x").await.unwrap(), "fixed");
        assert_eq!(backend.calls(), vec!["x"]);
    }

    #[test]
    fn test_exit_error_display() {
        let err = InferenceError::Exit { code: Some(2), stderr: "bad model".into() };
        assert_eq!(err.to_string(), "Backend exited with status 2: bad model");

        let err = InferenceError::Exit { code: None, stderr: String::new() };
        assert!(err.to_string().contains("a signal"));
    }
}
