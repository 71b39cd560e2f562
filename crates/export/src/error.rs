//! Error types for model export

use thiserror::Error;

use snake_common::TensorError;
use snake_core::CoreError;

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// A tensor the layout needs is not in the checkpoint
    #[error("missing tensor: {0}")]
    MissingTensor(String),

    /// Checkpoint lookup or conversion failed
    #[error(transparent)]
    Tensor(TensorError),

    /// Tensor could not be quantised (length not a whole number of groups)
    #[error("cannot quantise {name}: {source}")]
    Quantize {
        name: String,
        #[source]
        source: CoreError,
    },

    /// Tensor shapes disagree with the config or with each other
    #[error("shape mismatch for {name}: expected {expected}, got {got:?}")]
    ShapeMismatch {
        name: String,
        expected: String,
        got: Vec<usize>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TensorError> for ExportError {
    fn from(e: TensorError) -> Self {
        match e {
            TensorError::MissingTensor(name) => Self::MissingTensor(name),
            other => Self::Tensor(other),
        }
    }
}

impl From<candle_core::Error> for ExportError {
    fn from(e: candle_core::Error) -> Self {
        Self::Tensor(TensorError::Candle(e))
    }
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;
