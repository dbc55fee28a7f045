//! Error types for network construction.

use thiserror::Error;

/// Errors produced while assembling or initializing a network stack.
///
/// All failures are construction-time failures: a failed builder call yields
/// no partial stack, and nothing is retried.
#[derive(Debug, Error)]
pub enum NeuralError {
    /// A caller-supplied parameter is unusable (e.g. a zero step cadence).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A tensor or layer width does not line up with what an operation expects.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

impl NeuralError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        NeuralError::InvalidConfiguration(msg.into())
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        NeuralError::ShapeMismatch(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, NeuralError>;
