//! Interfaces to the collaborators around the exporter.
//!
//! The network, its training loop and the experiment tracker live outside
//! this workspace. They meet it through three small traits:
//!
//! * **[`TextCodec`]** — anything that maps text to token ids and back.
//! * **[`LanguageModel`]** — a trained model wrapped in an adapter that can
//!   score batches, sample text and save its weights for export.
//! * **[`MetricsSink`]** — where per-step training telemetry goes.

use std::path::{Path, PathBuf};

/// Text ↔ token id mapping.
pub trait TextCodec {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String>;
    fn vocab_size(&self) -> usize;
}

/// Capability interface of a trained language model.
///
/// Implemented by an adapter type that owns the underlying architecture.
pub trait LanguageModel {
    /// Mean next-token loss of `input_ids` against `labels` (same length).
    fn compute_loss(&self, input_ids: &[u32], labels: &[u32]) -> anyhow::Result<f32>;

    /// Continue `seed_text` by `num_predict` tokens.
    fn generate_text(
        &mut self,
        codec: &dyn TextCodec,
        seed_text: &str,
        num_predict: usize,
    ) -> anyhow::Result<String>;

    /// Write the weights (and config) under `dir`; returns the weights file.
    fn save(&self, dir: &Path) -> anyhow::Result<PathBuf>;
}

/// One training step as reported to telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub epoch: usize,
    pub batch: usize,
    pub loss: f32,
}

/// Receiver of per-step training telemetry.
pub trait MetricsSink {
    fn record(&mut self, record: &StepRecord);

    /// Called once after the last step.
    fn finish(&mut self) {}
}

/// Sink that writes every `log_every`-th step to `tracing`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    log_every: usize,
    last: Option<StepRecord>,
}

impl TracingSink {
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
            last: None,
        }
    }

    /// Most recent record seen, logged or not.
    pub fn last(&self) -> Option<&StepRecord> {
        self.last.as_ref()
    }
}

impl MetricsSink for TracingSink {
    fn record(&mut self, record: &StepRecord) {
        if record.step % self.log_every == 0 {
            tracing::info!(
                step = record.step,
                epoch = record.epoch,
                batch = record.batch,
                loss = format!("{:.4}", record.loss),
                "train"
            );
        }
        self.last = Some(*record);
    }

    fn finish(&mut self) {
        if let Some(r) = self.last {
            tracing::info!(step = r.step, loss = format!("{:.4}", r.loss), "train done");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
