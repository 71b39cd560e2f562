//! snake-export: checkpoint → flat binary model file and config header.
//!
//! | Module   | Purpose                                                  |
//! |----------|----------------------------------------------------------|
//! | `layout` | Fixed tensor order, quantisation policy, export profiles |
//! | `export` | `ModelExporter`: writes tensors as f32 or Q8_0           |
//! | `header` | `ConfigHeader`: model dimensions as C defines or `u64`s  |
//! | `error`  | `ExportError`                                            |

pub mod error;
pub mod export;
pub mod header;
pub mod layout;

#[cfg(test)]
mod fixtures;

pub use error::{ExportError, Result};
pub use export::{ExportSummary, ModelExporter, TensorReport};
pub use header::{ConfigHeader, HeaderFormat};
pub use layout::{
    export_names, ExportProfile, Q8Options, QuantPolicy, ScalePlacement, TensorSlot, EXPORT_ORDER,
};
