//! Config header for the inference runtime.
//!
//! Eight constants, in this order: `VOCAB_SIZE`, `ROUNDED_VOCAB_SIZE`,
//! `N_LAYER`, `D_MODEL`, `D_INNER`, `DT_RANK`, `D_STATE`, `D_CONV`. The three
//! last are read off layer 0 of the checkpoint; the rest come from the config.
//!
//! ```text
//! #pragma once
//!
//! #define VOCAB_SIZE 256
//! #define ROUNDED_VOCAB_SIZE 256
//!
//! #define N_LAYER 12
//! ...
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use snake_common::{a_key, a_log_key, ArchConfig, NamedTensors};

use crate::error::{ExportError, Result};
use crate::layout::{layer_name, CONV1D_WEIGHT, DT_PROJ_WEIGHT, EMBEDDING};

/// Output encoding of the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderFormat {
    /// C preprocessor defines.
    #[default]
    C,
    /// The constants as native-endian `u64`, same order.
    Binary,
}

/// Model dimensions the runtime is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigHeader {
    pub vocab_size: usize,
    pub rounded_vocab_size: usize,
    pub n_layer: usize,
    pub d_model: usize,
    pub d_inner: usize,
    pub dt_rank: usize,
    pub d_state: usize,
    pub d_conv: usize,
}

/// `A` if it has been derived, else `A_log`; both have the same shape.
fn state_matrix_name(tensors: &NamedTensors, layer: usize) -> String {
    let a = a_key(layer);
    if tensors.contains(&a) {
        a
    } else {
        a_log_key(layer)
    }
}

impl ConfigHeader {
    pub fn derive(tensors: &NamedTensors, config: &ArchConfig) -> Result<Self> {
        Ok(Self {
            vocab_size: config.vocab_size,
            rounded_vocab_size: config.rounded_vocab_size(),
            n_layer: config.n_layer,
            d_model: config.d_model,
            d_inner: config.d_inner(),
            dt_rank: tensors.dim(&layer_name(DT_PROJ_WEIGHT, 0), 1)?,
            d_state: tensors.dim(&state_matrix_name(tensors, 0), 1)?,
            d_conv: tensors.dim(&layer_name(CONV1D_WEIGHT, 0), 2)?,
        })
    }

    /// Check every layer against the derived dimensions.
    pub fn check(&self, tensors: &NamedTensors) -> Result<()> {
        let cols = tensors.dim(EMBEDDING, 1)?;
        if cols != self.d_model {
            return Err(mismatch(tensors, EMBEDDING, format!("[_, {}]", self.d_model)));
        }
        for layer in 0..self.n_layer {
            let a = state_matrix_name(tensors, layer);
            if tensors.dim(&a, 0)? != self.d_inner || tensors.dim(&a, 1)? != self.d_state {
                let expected = format!("[{}, {}]", self.d_inner, self.d_state);
                return Err(mismatch(tensors, &a, expected));
            }
            let conv = layer_name(CONV1D_WEIGHT, layer);
            if tensors.dim(&conv, 0)? != self.d_inner || tensors.dim(&conv, 2)? != self.d_conv {
                let expected = format!("[{}, _, {}]", self.d_inner, self.d_conv);
                return Err(mismatch(tensors, &conv, expected));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> [(&'static str, usize); 8] {
        [
            ("VOCAB_SIZE", self.vocab_size),
            ("ROUNDED_VOCAB_SIZE", self.rounded_vocab_size),
            ("N_LAYER", self.n_layer),
            ("D_MODEL", self.d_model),
            ("D_INNER", self.d_inner),
            ("DT_RANK", self.dt_rank),
            ("D_STATE", self.d_state),
            ("D_CONV", self.d_conv),
        ]
    }

    pub fn to_c_header(&self) -> String {
        let mut out = String::from("#pragma once\n\n");
        for (name, value) in self.entries() {
            out.push_str(&format!("#define {name} {value}\n"));
            if name == "ROUNDED_VOCAB_SIZE" {
                out.push('\n');
            }
        }
        out
    }

    pub fn to_binary(&self) -> Vec<u8> {
        self.entries()
            .iter()
            .flat_map(|&(_, value)| (value as u64).to_ne_bytes())
            .collect()
    }

    pub fn render(&self, format: HeaderFormat) -> Vec<u8> {
        match format {
            HeaderFormat::C => self.to_c_header().into_bytes(),
            HeaderFormat::Binary => self.to_binary(),
        }
    }

    /// Write the header to `path`, replacing any existing file.
    pub fn save(&self, path: &Path, format: HeaderFormat) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&self.render(format))?;
        writer.flush()?;
        tracing::info!(path = %path.display(), ?format, "Wrote config header");
        Ok(())
    }
}

fn mismatch(tensors: &NamedTensors, name: &str, expected: String) -> ExportError {
    ExportError::ShapeMismatch {
        name: name.to_string(),
        expected,
        got: tensors.shape(name).map(<[usize]>::to_vec).unwrap_or_default(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, tensor};

    #[test]
    fn derives_dimensions_from_layer_zero() {
        let tensors = fixtures::checkpoint(2);
        let header = ConfigHeader::derive(&tensors, &fixtures::config(2)).unwrap();
        assert_eq!(
            header,
            ConfigHeader {
                vocab_size: 16,
                rounded_vocab_size: 16,
                n_layer: 2,
                d_model: 8,
                d_inner: 16,
                dt_rank: 4,
                d_state: 4,
                d_conv: 4,
            }
        );
        header.check(&tensors).unwrap();
    }

    #[test]
    fn same_dimensions_before_and_after_derivation() {
        let mut tensors = fixtures::checkpoint(1);
        let config = fixtures::config(1);
        let before = ConfigHeader::derive(&tensors, &config).unwrap();
        tensors.derive_state_matrices(1).unwrap();
        assert_eq!(ConfigHeader::derive(&tensors, &config).unwrap(), before);
    }

    #[test]
    fn c_header_text() {
        let header = ConfigHeader {
            vocab_size: 50277,
            rounded_vocab_size: 50280,
            n_layer: 12,
            d_model: 768,
            d_inner: 1536,
            dt_rank: 48,
            d_state: 16,
            d_conv: 4,
        };
        assert_eq!(
            header.to_c_header(),
            "#pragma once\n\n\
             #define VOCAB_SIZE 50277\n\
             #define ROUNDED_VOCAB_SIZE 50280\n\n\
             #define N_LAYER 12\n\
             #define D_MODEL 768\n\
             #define D_INNER 1536\n\
             #define DT_RANK 48\n\
             #define D_STATE 16\n\
             #define D_CONV 4\n"
        );
    }

    #[test]
    fn binary_header_is_eight_words() {
        let tensors = fixtures::checkpoint(3);
        let header = ConfigHeader::derive(&tensors, &fixtures::config(3)).unwrap();
        let bytes = header.to_binary();
        assert_eq!(bytes.len(), 8 * 8);
        let words: Vec<u64> = bytes
            .chunks_exact(8)
            .map(|c| u64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(words, vec![16, 16, 3, 8, 16, 4, 4, 4]);
    }

    #[test]
    fn missing_layer_zero_tensor() {
        let mut tensors = fixtures::checkpoint(1);
        tensors.remove("layers.0.mixer.dt_proj.weight");
        let err = ConfigHeader::derive(&tensors, &fixtures::config(1)).unwrap_err();
        assert!(
            matches!(err, ExportError::MissingTensor(ref n) if n == "layers.0.mixer.dt_proj.weight")
        );
    }

    #[test]
    fn check_rejects_inconsistent_layer() {
        let mut tensors = fixtures::checkpoint(2);
        tensors.insert("layers.1.mixer.conv1d.weight", tensor(&[12, 1, 4], 0.0));
        let header = ConfigHeader::derive(&tensors, &fixtures::config(2)).unwrap();
        let err = header.check(&tensors).unwrap_err();
        match err {
            ExportError::ShapeMismatch { name, got, .. } => {
                assert_eq!(name, "layers.1.mixer.conv1d.weight");
                assert_eq!(got, vec![12, 1, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_rejects_wrong_embedding_width() {
        let mut tensors = fixtures::checkpoint(1);
        let mut config = fixtures::config(1);
        config.d_model = 4;
        let header = ConfigHeader::derive(&tensors, &config).unwrap();
        assert!(matches!(
            header.check(&tensors),
            Err(ExportError::ShapeMismatch { .. })
        ));
        tensors.insert("embedding.weight", tensor(&[16, 4], 0.0));
        assert!(header.check(&tensors).is_err());
    }

    #[test]
    fn save_writes_selected_format() {
        let dir = tempfile::tempdir().unwrap();
        let tensors = fixtures::checkpoint(1);
        let header = ConfigHeader::derive(&tensors, &fixtures::config(1)).unwrap();

        let c_path = dir.path().join("config.h");
        header.save(&c_path, HeaderFormat::C).unwrap();
        let text = std::fs::read_to_string(&c_path).unwrap();
        assert!(text.starts_with("#pragma once\n"));
        assert!(text.contains("#define D_CONV 4\n"));

        let bin_path = dir.path().join("config.bin");
        header.save(&bin_path, HeaderFormat::Binary).unwrap();
        assert_eq!(std::fs::read(&bin_path).unwrap(), header.to_binary());
    }
}
