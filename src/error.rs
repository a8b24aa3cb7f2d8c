//! Error types for the FID pipeline.

use thiserror::Error;

/// Errors raised while collecting activations or scoring populations.
#[derive(Debug, Error)]
pub enum FidError {
    /// Two arrays that must agree in shape do not.
    #[error("shape mismatch for {what}: {left:?} vs {right:?}")]
    ShapeMismatch {
        what: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// The matrix square root kept a non-negligible imaginary part.
    #[error("imaginary component {max_imag} in matrix square root")]
    NumericalInstability { max_imag: f64 },

    /// NaN or infinite values where finite moments are required.
    #[error("non-finite values in {what}")]
    NonFinite { what: &'static str },

    /// Consumed batches did not add up to the declared sample count.
    #[error("collected {actual} rows, expected {expected}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("need at least {required} samples, got {actual}")]
    TooFewSamples { required: usize, actual: usize },

    #[error("unknown {field} variant '{tag}'")]
    UnknownVariant { field: &'static str, tag: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Failure reported by an external model (extractor, sampler or imputer).
    #[error("model error: {0}")]
    Extractor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FidError {
    pub(crate) fn shape(what: &'static str, left: &[usize], right: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}

/// Result type for FID operations
pub type Result<T> = std::result::Result<T, FidError>;
