//! Error types for assimilation runs.

use thiserror::Error;

use crate::io::FieldFileError;

/// Errors that can occur while configuring or running an assimilation.
#[derive(Error, Debug)]
pub enum AssimError {
    /// Invalid configuration (non-positive grid step, empty window, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shape mismatch between state, observation, and mask tensors.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// The cost became NaN or infinite during optimization.
    ///
    /// The fit is aborted rather than returning a corrupted estimate;
    /// callers can skip or flag the sample.
    #[error("Cost diverged at iteration {iteration} (cost = {cost})")]
    Diverged { iteration: usize, cost: f64 },

    /// Backpropagation produced no gradient for the optimized parameters.
    #[error("No gradient available for the initial-state parameters")]
    MissingGradient,

    /// Reading or writing a persisted artifact failed.
    #[error(transparent)]
    FieldFile(#[from] FieldFileError),
}

impl AssimError {
    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
