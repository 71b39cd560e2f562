//! Error types for the tokenizer and quantizer

use thiserror::Error;

use crate::token::TokenId;

/// Tokenizer and quantizer errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Appending a token whose parent does not precede it
    #[error("invalid parent {parent} for new token (vocabulary has {len} entries)")]
    InvalidParent { parent: TokenId, len: usize },

    /// Vocabulary contents break the parent-chain invariant or an id is unknown
    #[error("corrupt vocabulary: {0}")]
    CorruptVocabulary(String),

    /// Parent id does not fit the 16-bit on-disk field
    #[error("token {id} has parent {parent}, which does not fit in 16 bits")]
    ParentOverflow { id: usize, parent: TokenId },

    /// Training needs ids 0–255 to be the byte roots
    #[error("vocabulary of {len} entries does not start with the 256 byte roots")]
    MissingByteRoots { len: usize },

    /// Special token text cannot be inserted
    #[error("invalid special token {0:?}")]
    InvalidSpecialToken(String),

    /// Tensor length is not a whole number of quantization groups
    #[error("tensor of {len} elements cannot be split into groups of {group_size}")]
    GroupSize { len: usize, group_size: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tokenizer and quantizer operations
pub type Result<T> = std::result::Result<T, CoreError>;
