//! Tiny in-memory checkpoint shared by the exporter and header tests.
//!
//! vocab 16, d_model 8, d_inner 16, dt_rank 4, d_state 4, d_conv 4. Every
//! quantised tensor is a whole number of 64-element groups.

use candle_core::{Device, Tensor};

use snake_common::{a_log_key, ArchConfig, NamedTensors};

pub const VOCAB: usize = 16;
pub const D_MODEL: usize = 8;
pub const D_INNER: usize = 16;
pub const DT_RANK: usize = 4;
pub const D_STATE: usize = 4;
pub const D_CONV: usize = 4;

pub fn config(n_layer: usize) -> ArchConfig {
    ArchConfig {
        vocab_size: VOCAB,
        n_layer,
        d_model: D_MODEL,
        tie_embeddings: false,
    }
}

/// Deterministic values, distinct per tensor via `seed`.
pub fn tensor(shape: &[usize], seed: f32) -> Tensor {
    let len: usize = shape.iter().product();
    let data: Vec<f32> = (0..len)
        .map(|i| ((i as f32) * 0.37 + seed).sin() * 0.5)
        .collect();
    Tensor::from_vec(data, shape, &Device::Cpu).unwrap()
}

/// A checkpoint as the trainer saves it: `backbone.` prefix and `A_log`.
pub fn checkpoint(n_layer: usize) -> NamedTensors {
    let mut t = NamedTensors::new();
    t.insert("backbone.embedding.weight", tensor(&[VOCAB, D_MODEL], 0.1));
    for l in 0..n_layer {
        let s = l as f32 * 10.0;
        let p = |name: &str| format!("backbone.layers.{l}.{name}");
        t.insert(p("mixer.in_proj.weight"), tensor(&[2 * D_INNER, D_MODEL], s + 1.0));
        t.insert(p("mixer.conv1d.weight"), tensor(&[D_INNER, 1, D_CONV], s + 2.0));
        t.insert(p("mixer.conv1d.bias"), tensor(&[D_INNER], s + 3.0));
        t.insert(
            p("mixer.x_proj.weight"),
            tensor(&[DT_RANK + 2 * D_STATE, D_INNER], s + 4.0),
        );
        t.insert(p("mixer.dt_proj.weight"), tensor(&[D_INNER, DT_RANK], s + 5.0));
        t.insert(p("mixer.dt_proj.bias"), tensor(&[D_INNER], s + 6.0));
        t.insert(format!("backbone.{}", a_log_key(l)), tensor(&[D_INNER, D_STATE], s + 7.0));
        t.insert(p("mixer.D"), tensor(&[D_INNER], s + 8.0));
        t.insert(p("mixer.out_proj.weight"), tensor(&[D_MODEL, D_INNER], s + 9.0));
        t.insert(p("norm.weight"), tensor(&[D_MODEL], s + 9.5));
    }
    t.insert("backbone.norm_f.weight", tensor(&[D_MODEL], 0.2));
    t.insert("lm_head.weight", tensor(&[VOCAB, D_MODEL], 0.3));
    t
}

/// Read native-endian f32s from `bytes`.
pub fn f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
