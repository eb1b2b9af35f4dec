//! Synod error types

use thiserror::Error;

use crate::backend::InferenceError;
use crate::hierarchy::NodePath;

/// Errors that can occur while building, persisting or running a hierarchy
#[derive(Debug, Error)]
pub enum SynodError {
    /// An agent's inference call failed
    #[error("Inference failed at {node}: {source}")]
    Inference {
        /// Position of the agent that failed
        node: NodePath,
        /// What the backend reported
        #[source]
        source: InferenceError,
    },

    /// Persisted topology is missing fields or structurally invalid
    #[error("Malformed topology: {0}")]
    MalformedTopology(String),

    /// Interactive input did not parse
    #[error("Invalid input: {0}")]
    ConfigInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynodError {
    /// The node that failed, if this is an inference failure
    pub fn node(&self) -> Option<&NodePath> {
        match self {
            SynodError::Inference { node, .. } => Some(node),
            _ => None,
        }
    }
}
