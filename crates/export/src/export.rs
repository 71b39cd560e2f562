//! Flat binary model export.
//!
//! # Format
//!
//! ```text
//! [embedding.weight]
//! [layers.0.mixer.in_proj.weight] [layers.1.mixer.in_proj.weight] ...
//! [layers.0.mixer.conv1d.weight]  ...
//! ...
//! [norm_f.weight]
//! [lm_head.weight]
//! ```
//!
//! No header, names or padding: the reader knows the order from
//! [`EXPORT_ORDER`] and the shapes from the config header. A plain tensor is
//! row-major native-endian f32. A quantised tensor is its int8 values
//! followed by its f32 scales; with [`ScalePlacement::PerTemplate`] the
//! values of every layer come first, then the scales of every layer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indicatif::ProgressBar;

use snake_common::{ArchConfig, NamedTensors};
use snake_core::{quantize_q8_0, QuantizedTensor};

use crate::error::{ExportError, Result};
use crate::header::ConfigHeader;
use crate::layout::{
    ExportProfile, Q8Options, ScalePlacement, EMBEDDING, EXPORT_ORDER, LM_HEAD,
};

/// What was written for one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorReport {
    pub name: String,
    pub shape: Vec<usize>,
    pub bytes: u64,
    /// Reconstruction error, for quantised tensors only.
    pub max_error: Option<f32>,
}

impl TensorReport {
    pub fn quantized(&self) -> bool {
        self.max_error.is_some()
    }
}

/// Result of a completed export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub bytes_written: u64,
    /// Layers whose `A` was derived from `A_log` during this export.
    pub derived_layers: usize,
    /// One entry per tensor, in file order.
    pub tensors: Vec<TensorReport>,
}

impl ExportSummary {
    pub fn quantized_count(&self) -> usize {
        self.tensors.iter().filter(|t| t.quantized()).count()
    }

    /// Largest error over all quantised tensors.
    pub fn max_error(&self) -> Option<f32> {
        self.tensors
            .iter()
            .filter_map(|t| t.max_error)
            .reduce(f32::max)
    }
}

/// Writes checkpoints in the flat layout.
#[derive(Debug, Clone)]
pub struct ModelExporter {
    profile: ExportProfile,
    check_shapes: bool,
    progress: ProgressBar,
}

impl Default for ModelExporter {
    fn default() -> Self {
        Self::new(ExportProfile::default())
    }
}

impl ModelExporter {
    pub fn new(profile: ExportProfile) -> Self {
        Self {
            profile,
            check_shapes: true,
            progress: ProgressBar::hidden(),
        }
    }

    /// Tick `progress` once per tensor. Hidden by default.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Verify per-layer shapes against layer 0 before writing (on by default).
    pub fn check_shapes(mut self, check: bool) -> Self {
        self.check_shapes = check;
        self
    }

    pub fn profile(&self) -> &ExportProfile {
        &self.profile
    }

    /// Write every tensor of `tensors` to `writer` in export order.
    ///
    /// `A_log` entries are replaced by `A = -exp(A_log)` first; the map is
    /// left in that state, so exporting it again produces the same bytes.
    pub fn export<W: Write>(
        &self,
        tensors: &mut NamedTensors,
        config: &ArchConfig,
        writer: &mut W,
    ) -> Result<ExportSummary> {
        let derived_layers = tensors.derive_state_matrices(config.n_layer)?;
        if self.check_shapes && config.n_layer > 0 {
            ConfigHeader::derive(tensors, config)?.check(tensors)?;
        }

        let total: usize = EXPORT_ORDER.iter().map(|s| s.expand(config.n_layer).len()).sum();
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let mut out = CountingWriter::new(writer);
        let mut reports = Vec::with_capacity(total);

        for slot in &EXPORT_ORDER {
            let names = slot.expand(config.n_layer);
            match self.profile.quantization(slot) {
                None => {
                    for name in &names {
                        let start = out.count;
                        let source = source_name(tensors, config, name)?;
                        write_f32(&mut out, &tensors.flat_f32(source)?)?;
                        reports.push(self.report(tensors, source, name, out.count - start, None)?);
                    }
                }
                Some(opts) if opts.placement == ScalePlacement::PerTemplate => {
                    let quantized = names
                        .iter()
                        .map(|name| quantize(tensors, config, name, opts))
                        .collect::<Result<Vec<_>>>()?;
                    let mut sizes = Vec::with_capacity(quantized.len());
                    for q in &quantized {
                        let start = out.count;
                        q.write_values(&mut out)?;
                        sizes.push(out.count - start);
                    }
                    for (q, size) in quantized.iter().zip(sizes.iter_mut()) {
                        let start = out.count;
                        q.write_scales(&mut out)?;
                        *size += out.count - start;
                    }
                    for ((name, q), size) in names.iter().zip(&quantized).zip(sizes) {
                        let source = source_name(tensors, config, name)?;
                        reports.push(self.report(tensors, source, name, size, Some(q.max_error))?);
                    }
                }
                Some(opts) => {
                    for name in &names {
                        let start = out.count;
                        let q = quantize(tensors, config, name, opts)?;
                        q.write_values(&mut out)?;
                        q.write_scales(&mut out)?;
                        let source = source_name(tensors, config, name)?;
                        reports.push(self.report(
                            tensors,
                            source,
                            name,
                            out.count - start,
                            Some(q.max_error),
                        )?);
                    }
                }
            }
        }
        out.flush()?;
        self.progress.finish();

        let summary = ExportSummary {
            bytes_written: out.count,
            derived_layers,
            tensors: reports,
        };
        tracing::info!(
            tensors = summary.tensors.len(),
            quantized = summary.quantized_count(),
            bytes = summary.bytes_written,
            "Export complete"
        );
        Ok(summary)
    }

    /// Export to `path`, replacing any existing file.
    pub fn export_to_path(
        &self,
        tensors: &mut NamedTensors,
        config: &ArchConfig,
        path: &Path,
    ) -> Result<ExportSummary> {
        let mut writer = BufWriter::new(File::create(path)?);
        let summary = self.export(tensors, config, &mut writer)?;
        tracing::info!(path = %path.display(), "Wrote model");
        Ok(summary)
    }

    fn report(
        &self,
        tensors: &NamedTensors,
        source: &str,
        name: &str,
        bytes: u64,
        max_error: Option<f32>,
    ) -> Result<TensorReport> {
        let shape = tensors.shape(source)?.to_vec();
        match max_error {
            Some(err) => tracing::info!(tensor = name, ?shape, bytes, max_error = err, "Quantised"),
            None => tracing::info!(tensor = name, ?shape, bytes, "Wrote"),
        }
        self.progress.inc(1);
        Ok(TensorReport {
            name: name.to_string(),
            shape,
            bytes,
            max_error,
        })
    }
}

/// Name holding the data for slot `name`.
///
/// With tied embeddings an absent head is served by the embedding.
fn source_name<'a>(tensors: &NamedTensors, config: &ArchConfig, name: &'a str) -> Result<&'a str> {
    if tensors.contains(name) {
        Ok(name)
    } else if name == LM_HEAD && config.tie_embeddings && tensors.contains(EMBEDDING) {
        tracing::debug!("lm_head.weight absent, writing tied embedding");
        Ok(EMBEDDING)
    } else {
        Err(ExportError::MissingTensor(name.to_string()))
    }
}

fn quantize(
    tensors: &NamedTensors,
    config: &ArchConfig,
    name: &str,
    opts: &Q8Options,
) -> Result<QuantizedTensor> {
    let source = source_name(tensors, config, name)?;
    let values = tensors.flat_f32(source)?;
    quantize_q8_0(&values, opts.group_size).map_err(|source| ExportError::Quantize {
        name: name.to_string(),
        source,
    })
}

fn write_f32<W: Write>(writer: &mut W, values: &[f32]) -> std::io::Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    writer.write_all(&bytes)
}

/// Counts bytes passed through to the inner writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, f32s, tensor};
    use crate::layout::export_names;
    use candle_core::DType;

    fn q8(placement: ScalePlacement) -> ModelExporter {
        ModelExporter::new(ExportProfile::Q8_0(Q8Options {
            placement,
            ..Q8Options::default()
        }))
    }

    fn run(exporter: &ModelExporter, n_layer: usize) -> (Vec<u8>, ExportSummary) {
        let mut tensors = fixtures::checkpoint(n_layer);
        let mut buf = Vec::new();
        let summary = exporter
            .export(&mut tensors, &fixtures::config(n_layer), &mut buf)
            .unwrap();
        (buf, summary)
    }

    #[test]
    fn float32_file_is_tensors_in_export_order() {
        let mut tensors = fixtures::checkpoint(2);
        let mut buf = Vec::new();
        let summary = ModelExporter::default()
            .export(&mut tensors, &fixtures::config(2), &mut buf)
            .unwrap();

        let expected: Vec<f32> = export_names(2)
            .iter()
            .flat_map(|name| tensors.flat_f32(name).unwrap())
            .collect();
        assert_eq!(f32s(&buf), expected);
        assert_eq!(buf.len(), 1912 * 4);
        assert_eq!(summary.bytes_written, buf.len() as u64);
        assert_eq!(summary.derived_layers, 2);
        assert_eq!(summary.tensors.len(), 23);
        assert_eq!(summary.quantized_count(), 0);
    }

    #[test]
    fn state_matrix_is_negative_exp() {
        let (buf, _) = run(&ModelExporter::default(), 2);
        let values = f32s(&buf);
        // embedding, in_proj x2, conv1d x2, conv bias x2, x_proj x2, dt_proj x2, dt bias x2
        let offset = 128 + 2 * (256 + 64 + 16 + 192 + 64 + 16);
        let a_log: Vec<f32> = tensor(&[16, 4], 7.0)
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        for (got, x) in values[offset..offset + 64].iter().zip(&a_log) {
            assert!((got - -x.exp()).abs() < 1e-6);
        }
    }

    #[test]
    fn export_is_deterministic() {
        for exporter in [
            ModelExporter::default(),
            q8(ScalePlacement::PerTensor),
            q8(ScalePlacement::PerTemplate),
        ] {
            let (a, _) = run(&exporter, 2);
            let (b, _) = run(&exporter, 2);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn re_export_of_derived_map_is_identical() {
        let mut tensors = fixtures::checkpoint(1);
        let config = fixtures::config(1);
        let exporter = ModelExporter::default();
        let mut first = Vec::new();
        let mut second = Vec::new();
        exporter.export(&mut tensors, &config, &mut first).unwrap();
        let summary = exporter.export(&mut tensors, &config, &mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(summary.derived_layers, 0);
    }

    #[test]
    fn q8_per_tensor_layout() {
        let (buf, summary) = run(&q8(ScalePlacement::PerTensor), 2);
        assert_eq!(buf.len(), 3512);
        assert_eq!(summary.bytes_written, 3512);
        assert_eq!(summary.quantized_count(), 8);

        // embedding: 128 int8 values, then two scales
        let values: Vec<i8> = buf[..128].iter().map(|&b| b as i8).collect();
        let scales = f32s(&buf[128..136]);
        let original = fixtures::checkpoint(0).flat_f32("embedding.weight").unwrap();
        for (i, (&q, &w)) in values.iter().zip(&original).enumerate() {
            let scale = scales[i / 64];
            assert!((f32::from(q) * scale - w).abs() <= scale / 2.0 + 1e-6);
        }
        assert_eq!(summary.tensors[0].bytes, 136);
        assert!(summary.tensors[0].max_error.unwrap() <= scales[0].max(scales[1]));
    }

    #[test]
    fn q8_per_template_groups_scales_after_values() {
        let (tensor_major, _) = run(&q8(ScalePlacement::PerTensor), 2);
        let (template_major, summary) = run(&q8(ScalePlacement::PerTemplate), 2);
        assert_eq!(tensor_major.len(), template_major.len());
        assert_eq!(tensor_major[..136], template_major[..136]);

        // in_proj: [v0][s0][v1][s1] vs [v0][v1][s0][s1]
        let l0 = &tensor_major[136..408];
        let l1 = &tensor_major[408..680];
        let expected: Vec<u8> = [&l0[..256], &l1[..256], &l0[256..], &l1[256..]].concat();
        assert_eq!(template_major[136..680], expected[..]);

        assert_eq!(summary.tensors[1].name, "layers.0.mixer.in_proj.weight");
        assert_eq!(summary.tensors[1].bytes, 272);
    }

    #[test]
    fn float_tensors_keep_their_place_between_quantised_ones() {
        let (f32_buf, _) = run(&ModelExporter::default(), 1);
        let (q8_buf, _) = run(&q8(ScalePlacement::PerTensor), 1);
        // conv1d.weight directly follows the quantised in_proj
        let f32_conv = &f32_buf[(128 + 256) * 4..(128 + 256 + 64) * 4];
        let q8_conv = &q8_buf[136 + 272..136 + 272 + 256];
        assert_eq!(f32_conv, q8_conv);
    }

    #[test]
    fn tied_embeddings_fill_lm_head() {
        let mut tensors = fixtures::checkpoint(1);
        tensors.remove("lm_head.weight");
        let mut config = fixtures::config(1);

        let err = ModelExporter::default()
            .export(&mut tensors, &config, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingTensor(ref n) if n == "lm_head.weight"));

        config.tie_embeddings = true;
        let mut buf = Vec::new();
        let summary = ModelExporter::default()
            .export(&mut tensors, &config, &mut buf)
            .unwrap();
        let values = f32s(&buf);
        let embedding = tensors.flat_f32("embedding.weight").unwrap();
        assert_eq!(values[values.len() - 128..], embedding[..]);
        assert_eq!(summary.tensors.last().unwrap().name, "lm_head.weight");
    }

    #[test]
    fn missing_per_layer_tensor() {
        let mut tensors = fixtures::checkpoint(2);
        tensors.remove("layers.1.mixer.D");
        let err = ModelExporter::default()
            .export(&mut tensors, &fixtures::config(2), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingTensor(ref n) if n == "layers.1.mixer.D"));
    }

    #[test]
    fn missing_a_log_is_reported() {
        let mut tensors = fixtures::checkpoint(2);
        tensors.remove("layers.1.mixer.A_log");
        let err = ModelExporter::default()
            .export(&mut tensors, &fixtures::config(2), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingTensor(ref n) if n == "layers.1.mixer.A_log"));
    }

    #[test]
    fn group_size_must_divide_tensor() {
        let exporter = ModelExporter::new(ExportProfile::Q8_0(Q8Options {
            group_size: 48,
            ..Q8Options::default()
        }));
        let mut tensors = fixtures::checkpoint(1);
        let err = exporter
            .export(&mut tensors, &fixtures::config(1), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::Quantize { ref name, .. } if name == "embedding.weight"));
    }

    #[test]
    fn half_precision_is_widened() {
        let mut tensors = fixtures::checkpoint(1);
        let half = tensors
            .get("embedding.weight")
            .unwrap()
            .to_dtype(DType::F16)
            .unwrap();
        tensors.insert("embedding.weight", half);
        let mut buf = Vec::new();
        let summary = ModelExporter::default()
            .export(&mut tensors, &fixtures::config(1), &mut buf)
            .unwrap();
        assert_eq!(summary.tensors[0].bytes, 128 * 4);
        let original = fixtures::checkpoint(0).flat_f32("embedding.weight").unwrap();
        for (got, want) in f32s(&buf[..512]).iter().zip(&original) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn shape_check_runs_before_writing() {
        let mut tensors = fixtures::checkpoint(2);
        tensors.insert("layers.1.mixer.A_log", tensor(&[16, 8], 0.0));
        let mut buf = Vec::new();
        let err = ModelExporter::default()
            .export(&mut tensors, &fixtures::config(2), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ExportError::ShapeMismatch { .. }));
        assert!(buf.is_empty());

        let summary = ModelExporter::default()
            .check_shapes(false)
            .export(&mut tensors, &fixtures::config(2), &mut buf)
            .unwrap();
        assert_eq!(summary.bytes_written, buf.len() as u64);
    }

    #[test]
    fn export_to_path_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, vec![0u8; 10_000]).unwrap();
        let mut tensors = fixtures::checkpoint(1);
        let summary = ModelExporter::default()
            .export_to_path(&mut tensors, &fixtures::config(1), &path)
            .unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.bytes_written);
    }
}
