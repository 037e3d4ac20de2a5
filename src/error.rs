//! Error types for the multi-task traffic model

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Tensor engine failure (shape/dtype mismatch inside an op, I/O of safetensors)
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// A bound input does not match its placeholder declaration
    #[error("Shape mismatch for `{slot}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        slot: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Categorical index outside the embedding vocabulary
    #[error("Index {index} out of range for `{field}` (vocabulary size {vocab})")]
    IndexOutOfRange {
        field: &'static str,
        index: u32,
        vocab: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No checkpoint where one was required
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// The batch source stopped before the precomputed step count
    #[error("Batch source exhausted after {0} batches")]
    SourceExhausted(usize),

    /// Not enough samples to run a pass
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Host array reshape failure
    #[error("Array shape error: {0}")]
    ArrayShape(#[from] ndarray::ShapeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Whether the error comes from a tensor/placeholder shape disagreement
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Error::ShapeMismatch { .. } | Error::ArrayShape(_))
    }
}
