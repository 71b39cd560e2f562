//! Error types for checkpoint tensor handling

use thiserror::Error;

/// Checkpoint tensor errors
#[derive(Debug, Error)]
pub enum TensorError {
    /// A tensor the caller needs is not in the checkpoint
    #[error("missing tensor: {0}")]
    MissingTensor(String),

    /// Tensor rank is lower than the dimension being read
    #[error("tensor {name} has shape {shape:?}, expected at least {rank} dims")]
    Rank {
        name: String,
        shape: Vec<usize>,
        rank: usize,
    },

    /// Tensor library error
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type for tensor operations
pub type Result<T> = std::result::Result<T, TensorError>;
