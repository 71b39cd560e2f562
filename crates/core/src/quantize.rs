//! Q8_0 quantisation: group-wise symmetric int8 with one f32 scale per group.
//!
//! ```text
//! scale  = max(|group|) / 127          (0 for an all-zero group)
//! q[i]   = clamp(round(w[i] / scale), -127, 127)
//! w'[i]  = q[i] * scale
//! ```
//!
//! -128 is never produced, so the representable range is symmetric. Rounding
//! is half-to-even, matching the tensor library the checkpoints come from.
//! The reported error is for logging only; it never fails an export.

use std::io::Write;

use rayon::prelude::*;

use crate::error::{CoreError, Result};

/// Default number of elements sharing one scale.
pub const DEFAULT_GROUP_SIZE: usize = 64;

/// Largest quantised magnitude.
pub const Q8_MAX: f32 = 127.0;

/// A tensor in Q8_0 form, groups in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub values: Vec<i8>,
    pub scales: Vec<f32>,
    pub group_size: usize,
    /// Largest `|w' - w|` over all groups.
    pub max_error: f32,
}

impl QuantizedTensor {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn num_groups(&self) -> usize {
        self.scales.len()
    }

    /// Reconstruct `q * scale` for every element.
    pub fn dequantize(&self) -> Vec<f32> {
        self.values
            .chunks(self.group_size)
            .zip(&self.scales)
            .flat_map(|(group, &scale)| group.iter().map(move |&q| f32::from(q) * scale))
            .collect()
    }

    /// Write the int8 payload, one byte per element.
    pub fn write_values<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let bytes: Vec<u8> = self.values.iter().map(|&q| q as u8).collect();
        writer.write_all(&bytes)
    }

    /// Write the scales as native-endian f32.
    pub fn write_scales<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let bytes: Vec<u8> = self.scales.iter().flat_map(|s| s.to_ne_bytes()).collect();
        writer.write_all(&bytes)
    }
}

/// Quantise `values` in groups of `group_size`.
///
/// The length must be a whole number of groups; anything else is
/// [`CoreError::GroupSize`].
pub fn quantize_q8_0(values: &[f32], group_size: usize) -> Result<QuantizedTensor> {
    if group_size == 0 || values.len() % group_size != 0 {
        return Err(CoreError::GroupSize {
            len: values.len(),
            group_size,
        });
    }

    let groups: Vec<(Vec<i8>, f32, f32)> = values
        .par_chunks(group_size)
        .map(quantize_group)
        .collect();

    let mut out = QuantizedTensor {
        values: Vec::with_capacity(values.len()),
        scales: Vec::with_capacity(groups.len()),
        group_size,
        max_error: 0.0,
    };
    for (q, scale, err) in groups {
        out.values.extend(q);
        out.scales.push(scale);
        out.max_error = out.max_error.max(err);
    }
    Ok(out)
}

/// Quantise one group; returns `(values, scale, max error)`.
fn quantize_group(group: &[f32]) -> (Vec<i8>, f32, f32) {
    let wmax = group.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let scale = wmax / Q8_MAX;
    // Also catches subnormal maxima whose scale underflows.
    if scale == 0.0 {
        return (vec![0; group.len()], 0.0, wmax);
    }
    let mut err = 0.0f32;
    let q = group
        .iter()
        .map(|&w| {
            let q = (w / scale).round_ties_even().clamp(-Q8_MAX, Q8_MAX) as i8;
            err = err.max((f32::from(q) * scale - w).abs());
            q
        })
        .collect();
    (q, scale, err)
}

// ── Tests ───────────────────────────────────────────────────────────────────
