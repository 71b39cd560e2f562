//! The fixed tensor order of the model file and the quantisation policy.
//!
//! Order is template-major, layer-minor: each per-layer template is written
//! for every layer before the next template starts. Readers depend on it.

use std::collections::BTreeSet;

use snake_core::DEFAULT_GROUP_SIZE;

/// Placeholder for the layer index in per-layer templates.
pub const LAYER_PLACEHOLDER: &str = "{layer}";

/// Whether a slot is written once or once per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Model,
    PerLayer,
}

/// One entry of the export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorSlot {
    pub template: &'static str,
    pub scope: Scope,
}

impl TensorSlot {
    const fn model(template: &'static str) -> Self {
        Self {
            template,
            scope: Scope::Model,
        }
    }

    const fn layer(template: &'static str) -> Self {
        Self {
            template,
            scope: Scope::PerLayer,
        }
    }

    /// Concrete tensor names, in layer order.
    pub fn expand(&self, n_layer: usize) -> Vec<String> {
        match self.scope {
            Scope::Model => vec![self.template.to_string()],
            Scope::PerLayer => (0..n_layer)
                .map(|layer| self.template.replace(LAYER_PLACEHOLDER, &layer.to_string()))
                .collect(),
        }
    }
}

pub const EMBEDDING: &str = "embedding.weight";
pub const IN_PROJ: &str = "layers.{layer}.mixer.in_proj.weight";
pub const CONV1D_WEIGHT: &str = "layers.{layer}.mixer.conv1d.weight";
pub const CONV1D_BIAS: &str = "layers.{layer}.mixer.conv1d.bias";
pub const X_PROJ: &str = "layers.{layer}.mixer.x_proj.weight";
pub const DT_PROJ_WEIGHT: &str = "layers.{layer}.mixer.dt_proj.weight";
pub const DT_PROJ_BIAS: &str = "layers.{layer}.mixer.dt_proj.bias";
pub const A: &str = "layers.{layer}.mixer.A";
pub const D: &str = "layers.{layer}.mixer.D";
pub const OUT_PROJ: &str = "layers.{layer}.mixer.out_proj.weight";
pub const NORM: &str = "layers.{layer}.norm.weight";
pub const NORM_F: &str = "norm_f.weight";
pub const LM_HEAD: &str = "lm_head.weight";

/// The model file layout.
pub const EXPORT_ORDER: [TensorSlot; 13] = [
    TensorSlot::model(EMBEDDING),
    TensorSlot::layer(IN_PROJ),
    TensorSlot::layer(CONV1D_WEIGHT),
    TensorSlot::layer(CONV1D_BIAS),
    TensorSlot::layer(X_PROJ),
    TensorSlot::layer(DT_PROJ_WEIGHT),
    TensorSlot::layer(DT_PROJ_BIAS),
    TensorSlot::layer(A),
    TensorSlot::layer(D),
    TensorSlot::layer(OUT_PROJ),
    TensorSlot::layer(NORM),
    TensorSlot::model(NORM_F),
    TensorSlot::model(LM_HEAD),
];

/// Name of `template` for `layer`.
pub fn layer_name(template: &str, layer: usize) -> String {
    template.replace(LAYER_PLACEHOLDER, &layer.to_string())
}

/// Every tensor name in file order.
pub fn export_names(n_layer: usize) -> Vec<String> {
    EXPORT_ORDER
        .iter()
        .flat_map(|slot| slot.expand(n_layer))
        .collect()
}

/// Templates whose tensors are stored as Q8_0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantPolicy {
    templates: BTreeSet<String>,
}

impl Default for QuantPolicy {
    /// The large matrices: embedding, input/x/output projections and the head.
    fn default() -> Self {
        Self::from_templates([EMBEDDING, IN_PROJ, X_PROJ, OUT_PROJ, LM_HEAD])
    }
}

impl QuantPolicy {
    pub fn none() -> Self {
        Self {
            templates: BTreeSet::new(),
        }
    }

    pub fn from_templates<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            templates: templates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, template: &str) -> bool {
        self.templates.contains(template)
    }
}

/// Where the scales of a quantised per-layer template go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScalePlacement {
    /// `[values][scales]` for each tensor in turn.
    #[default]
    PerTensor,
    /// Values of every layer of the template, then scales of every layer.
    PerTemplate,
}

/// Settings of the Q8_0 profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Q8Options {
    pub group_size: usize,
    pub policy: QuantPolicy,
    pub placement: ScalePlacement,
}

impl Default for Q8Options {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            policy: QuantPolicy::default(),
            placement: ScalePlacement::default(),
        }
    }
}

/// How tensors are encoded in the model file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExportProfile {
    /// Everything as plain f32.
    #[default]
    Float32,
    /// Policy templates as Q8_0, the rest as f32.
    Q8_0(Q8Options),
}

impl ExportProfile {
    /// Quantisation settings for `slot`, or `None` when it is written as f32.
    pub fn quantization(&self, slot: &TensorSlot) -> Option<&Q8Options> {
        match self {
            Self::Float32 => None,
            Self::Q8_0(opts) if opts.policy.contains(slot.template) => Some(opts),
            Self::Q8_0(_) => None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
