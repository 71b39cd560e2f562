//! Architecture configuration for exported models.
//!
//! Read from the training run's `config.json` (Mamba layout). Unknown fields
//! such as `ssm_cfg` or `fused_add_norm` are ignored, so the file produced by
//! the trainer can be passed in unchanged.

use serde::{Deserialize, Serialize};

/// Vocabulary sizes are padded up to a multiple of this for the runtime.
pub const VOCAB_PAD_MULTIPLE: usize = 8;

/// Architecture constants the exporter and header generator need.
///
/// `dt_rank`, `d_state` and `d_conv` come from tensor shapes, not from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchConfig {
    // ── Core dimensions ─────────────────────────────────────────────────────
    /// Vocabulary size (must match the tokenizer).
    pub vocab_size: usize,
    /// Number of mixer layers.
    pub n_layer: usize,
    /// Model width.
    pub d_model: usize,

    // ── Head ────────────────────────────────────────────────────────────────
    /// Output head shares the embedding matrix. When set and the checkpoint
    /// has no `lm_head.weight`, the embedding is exported in its slot.
    #[serde(default)]
    pub tie_embeddings: bool,
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for ArchConfig {
    fn default() -> Self {
        Self {
            vocab_size: 256, // byte-level tokenizer
            n_layer: 12,
            d_model: 768,
            tie_embeddings: false,
        }
    }
}

impl ArchConfig {
    /// Inner (expanded) width of each mixer: `2 * d_model`.
    pub fn d_inner(&self) -> usize {
        2 * self.d_model
    }

    /// `vocab_size` rounded up to the next multiple of [`VOCAB_PAD_MULTIPLE`].
    pub fn rounded_vocab_size(&self) -> usize {
        self.vocab_size.div_ceil(VOCAB_PAD_MULTIPLE) * VOCAB_PAD_MULTIPLE
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
