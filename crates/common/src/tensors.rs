//! Named checkpoint tensors.
//!
//! A flat `name → Tensor` mapping as produced by the trainer. Keys use the
//! dot-path layout of the Mamba reference model (`layers.0.mixer.D`,
//! `norm_f.weight`, ...). Checkpoints saved from the full language-model
//! wrapper prefix every key with `backbone.`; the prefix is stripped on load.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use crate::error::{Result, TensorError};

/// Prefix added by the language-model wrapper around the backbone.
pub const BACKBONE_PREFIX: &str = "backbone.";

/// Key of the log-parameterised state matrix of `layer`.
pub fn a_log_key(layer: usize) -> String {
    format!("layers.{layer}.mixer.A_log")
}

/// Key of the derived state matrix `A = -exp(A_log)` of `layer`.
pub fn a_key(layer: usize) -> String {
    format!("layers.{layer}.mixer.A")
}

/// Owned mapping from dot-path names to dense tensors.
#[derive(Debug, Clone, Default)]
pub struct NamedTensors {
    tensors: HashMap<String, Tensor>,
}

impl NamedTensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a checkpoint from disk onto the CPU.
    ///
    /// `.safetensors` files are read directly; anything else is treated as a
    /// PyTorch pickle (`pytorch_model.bin`).
    pub fn load(path: &Path) -> Result<Self> {
        let is_safetensors = path
            .extension()
            .map(|e| e == "safetensors")
            .unwrap_or(false);
        let entries: Vec<(String, Tensor)> = if is_safetensors {
            candle_core::safetensors::load(path, &Device::Cpu)?
                .into_iter()
                .collect()
        } else {
            candle_core::pickle::read_all(path)?
        };
        let tensors: Self = entries.into_iter().collect();
        tracing::info!(
            path = %path.display(),
            tensors = tensors.len(),
            "Loaded checkpoint"
        );
        Ok(tensors)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Like [`get`](Self::get) but a missing key is an error.
    pub fn require(&self, name: &str) -> Result<&Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| TensorError::MissingTensor(name.to_string()))
    }

    /// Insert a tensor, stripping any `backbone.` prefix from the key.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        let name = name.into();
        let key = match name.strip_prefix(BACKBONE_PREFIX) {
            Some(stripped) => stripped.to_string(),
            None => name,
        };
        self.tensors.insert(key, tensor)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.tensors.remove(name)
    }

    /// Tensor names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        Ok(self.require(name)?.dims())
    }

    /// Size of dimension `dim` of tensor `name`.
    pub fn dim(&self, name: &str, dim: usize) -> Result<usize> {
        let shape = self.shape(name)?;
        shape.get(dim).copied().ok_or_else(|| TensorError::Rank {
            name: name.to_string(),
            shape: shape.to_vec(),
            rank: dim + 1,
        })
    }

    /// Flatten tensor `name` row-major into `f32`, converting from any float dtype.
    pub fn flat_f32(&self, name: &str) -> Result<Vec<f32>> {
        let t = self.require(name)?;
        Ok(t.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
    }

    /// Replace each layer's `A_log` with the state matrix `A = -exp(A_log)`.
    ///
    /// Layers that already carry `A` and no `A_log` are left alone, so calling
    /// this twice is harmless. Returns the number of layers converted.
    pub fn derive_state_matrices(&mut self, n_layer: usize) -> Result<usize> {
        let mut derived = 0;
        for layer in 0..n_layer {
            let a_log_name = a_log_key(layer);
            let a_name = a_key(layer);
            match self.tensors.remove(&a_log_name) {
                Some(a_log) => {
                    let a = a_log.to_dtype(DType::F32)?.exp()?.neg()?;
                    self.tensors.insert(a_name, a);
                    derived += 1;
                }
                None if self.tensors.contains_key(&a_name) => {}
                None => return Err(TensorError::MissingTensor(a_log_name)),
            }
        }
        tracing::debug!(layers = derived, "Derived A = -exp(A_log)");
        Ok(derived)
    }
}

impl FromIterator<(String, Tensor)> for NamedTensors {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (name, tensor) in iter {
            out.insert(name, tensor);
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
