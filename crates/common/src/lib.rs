//! # snake-common — Shared Primitives
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`ArchConfig`]** — architecture constants (read from the trainer's JSON).
//! * **[`NamedTensors`]** — checkpoint tensors by dot-path name, with the
//!   derived state matrices.
//! * **[`TextCodec`]**, **[`LanguageModel`]**, **[`MetricsSink`]** — the seams
//!   to the tokenizer, the trained model and training telemetry.

pub mod config;
pub mod error;
pub mod model;
pub mod tensors;

pub use config::{ArchConfig, VOCAB_PAD_MULTIPLE};
pub use error::TensorError;
pub use model::{LanguageModel, MetricsSink, StepRecord, TextCodec, TracingSink};
pub use tensors::{a_key, a_log_key, NamedTensors, BACKBONE_PREFIX};
