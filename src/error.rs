//! Error types for the engine.
//!
//! Most runtime failures are absorbed and logged where they happen (a failed
//! trigger must not stop the other layers); these types cover the cases that
//! are reported to the caller.

use thiserror::Error;

use crate::toolkit::ToolkitError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown layer `{0}` (expected drone, bell, static or choir)")]
    UnknownLayer(String),

    #[error("audio output is not running; resume the output device and retry")]
    OutputUnavailable,

    #[error("audio toolkit: {0}")]
    Toolkit(#[from] ToolkitError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("could not encode configuration: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::OutputUnavailable | EngineError::Toolkit(ToolkitError::QueueFull)
        )
    }
}
