//! # snake-core — Tokenizer and Quantizer
//!
//! The two algorithms behind the exported artifacts:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`token`] | `Token`, the 3-byte on-disk record |
//! | [`vocab`] | `Vocab`: append-only forest of byte chains, `(byte, parent)` lookup, persistence |
//! | [`tokenizer`] | `Tokenizer`: merge training, greedy encode, chain decode, special tokens |
//! | [`byte_tokenizer`] | `ByteTokenizer`: ASCII fallback when no vocabulary is trained |
//! | [`quantize`] | Q8_0 group-wise symmetric int8 quantisation |
//!
//! ## Design principles
//!
//! 1. **Fixed layouts.** The vocabulary file has no header; its records are
//!    the vocabulary, in id order.
//! 2. **Deterministic.** Training ties break on first occurrence; quantisation
//!    output order does not depend on the thread pool.
//! 3. **No overloaded sentinels.** Lookups return `Option`; id 0 is only ever
//!    the NUL root (and the on-disk "no parent" value).

pub mod byte_tokenizer;
pub mod error;
pub mod quantize;
pub mod token;
pub mod tokenizer;
pub mod vocab;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use byte_tokenizer::ByteTokenizer;
pub use error::{CoreError, Result};
pub use quantize::{quantize_q8_0, QuantizedTensor, DEFAULT_GROUP_SIZE, Q8_MAX};
pub use token::{Token, TokenId, NUM_BYTE_ROOTS, RECORD_LEN, ROOT};
pub use tokenizer::{Tokenizer, TrainReport};
pub use vocab::Vocab;
