//! Structured weight collections and the per-iteration layer selection.
//!
//! Weights are a flat name→tensor mapping rather than a nested tree;
//! the stage/layer index-transform is applied uniformly to every leaf.
//! [`StackedWeights`] leaves carry a leading `num_layers` axis, the
//! per-iteration [`StageWeights`] view a leading `num_stages` axis, and
//! the [`LayerWeights`] handed to the stage function no leading axis at
//! all — exactly one layer's parameters.

use std::collections::BTreeMap;

use ringpipe_types::Tensor;

use crate::error::{PipelineError, Result};

// ── Single layer ─────────────────────────────────────────────────────────────

/// Parameters of one logical layer: leaf name → tensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerWeights {
    leaves: BTreeMap<String, Tensor>,
}

impl LayerWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.leaves.insert(name.into(), tensor);
    }

    /// Leaf by name; missing leaves are a weights error, not a panic.
    pub fn leaf(&self, name: &str) -> Result<&Tensor> {
        self.leaves
            .get(name)
            .ok_or_else(|| PipelineError::Weights(format!("missing leaf '{name}'")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.leaves.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

// ── All layers, stacked ──────────────────────────────────────────────────────

/// Full weight set: every leaf has leading dimension `num_layers`.
/// Never mutated by the engine; only re-sliced into per-stage views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackedWeights {
    leaves: BTreeMap<String, Tensor>,
}

impl StackedWeights {
    /// Stack per-layer weight sets along a new leading layer axis.
    ///
    /// All layers must carry identical leaf names and shapes.
    pub fn from_layers(layers: &[LayerWeights]) -> Result<Self> {
        let first = layers.first().ok_or_else(|| {
            PipelineError::Weights("cannot stack an empty layer list".into())
        })?;

        let mut leaves = BTreeMap::new();
        for name in first.names() {
            let parts: Vec<Tensor> = layers
                .iter()
                .map(|layer| layer.leaf(name).cloned())
                .collect::<Result<_>>()?;
            leaves.insert(name.to_string(), Tensor::stack(&parts)?);
        }

        // A later layer may carry leaves the first does not.
        for (i, layer) in layers.iter().enumerate() {
            if layer.len() != first.len() {
                return Err(PipelineError::Weights(format!(
                    "layer {i} has {} leaves, layer 0 has {}",
                    layer.len(),
                    first.len()
                )));
            }
        }

        Ok(Self { leaves })
    }

    /// Insert an already-stacked leaf (leading dimension `num_layers`).
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.leaves.insert(name.into(), tensor);
    }

    pub fn leaf(&self, name: &str) -> Result<&Tensor> {
        self.leaves
            .get(name)
            .ok_or_else(|| PipelineError::Weights(format!("missing leaf '{name}'")))
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Check every leaf's leading dimension against the configured layer
    /// count. Fatal before the loop starts: the schedule has no way to
    /// recover from an out-of-range layer id mid-loop.
    pub fn validate_num_layers(&self, num_layers: usize) -> Result<()> {
        for (name, tensor) in &self.leaves {
            let dim0 = tensor.shape().first().copied().unwrap_or(0);
            if dim0 != num_layers {
                return Err(PipelineError::Weights(format!(
                    "leaf '{name}' has leading dimension {dim0}, \
                     expected num_layers = {num_layers}"
                )));
            }
        }
        Ok(())
    }

    /// Gather the given layer rows of every leaf into a stage-major view.
    /// `layer_ids[s]` names the layer stage `s` computes with; each stage
    /// receives only its own layer slice.
    pub fn select_layers(&self, layer_ids: &[usize]) -> Result<StageWeights> {
        let mut leaves = BTreeMap::new();
        for (name, tensor) in &self.leaves {
            let dim0 = tensor.shape().first().copied().unwrap_or(0);
            if let Some(&bad) = layer_ids.iter().find(|&&id| id >= dim0) {
                return Err(PipelineError::Weights(format!(
                    "layer id {bad} out of range for leaf '{name}' ({dim0} layers)"
                )));
            }
            let rows: Vec<Tensor> = layer_ids.iter().map(|&id| tensor.row(id)).collect();
            leaves.insert(name.clone(), Tensor::stack(&rows)?);
        }
        Ok(StageWeights { leaves })
    }
}

// ── Per-iteration stage view ─────────────────────────────────────────────────

/// One iteration's weights: every leaf has leading dimension `num_stages`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageWeights {
    leaves: BTreeMap<String, Tensor>,
}

impl StageWeights {
    /// The single-layer weight set for stage `s`.
    pub fn stage(&self, s: usize) -> LayerWeights {
        let mut out = LayerWeights::new();
        for (name, tensor) in &self.leaves {
            out.insert(name.clone(), tensor.row(s));
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(scale: f32) -> LayerWeights {
        let mut w = LayerWeights::new();
        w.insert("scale", Tensor::from_vec(vec![1], vec![scale]).unwrap());
        w.insert(
            "bias",
            Tensor::from_vec(vec![2], vec![scale * 10.0, scale * 10.0 + 1.0]).unwrap(),
        );
        w
    }

    #[test]
    fn stack_and_select_round_trip() {
        let stacked =
            StackedWeights::from_layers(&[layer(1.0), layer(2.0), layer(3.0)]).unwrap();
        stacked.validate_num_layers(3).unwrap();

        // Circular selection: stages 0 and 1 on layers 2 and 1.
        let stage_view = stacked.select_layers(&[2, 1]).unwrap();
        let s0 = stage_view.stage(0);
        let s1 = stage_view.stage(1);
        assert_eq!(s0.leaf("scale").unwrap().data(), &[3.0]);
        assert_eq!(s1.leaf("scale").unwrap().data(), &[2.0]);
        assert_eq!(s0.leaf("bias").unwrap().data(), &[30.0, 31.0]);
    }

    #[test]
    fn validate_rejects_wrong_layer_count() {
        let stacked = StackedWeights::from_layers(&[layer(1.0), layer(2.0)]).unwrap();
        let err = stacked.validate_num_layers(4).unwrap_err();
        assert!(err.to_string().contains("expected num_layers = 4"));
    }

    #[test]
    fn select_rejects_out_of_range_layer() {
        let stacked = StackedWeights::from_layers(&[layer(1.0), layer(2.0)]).unwrap();
        assert!(stacked.select_layers(&[0, 2]).is_err());
    }

    #[test]
    fn missing_leaf_is_an_error() {
        let w = layer(1.0);
        assert!(w.leaf("scale").is_ok());
        assert!(w.leaf("gamma").is_err());
    }

    #[test]
    fn mismatched_layer_structure_rejected() {
        let mut odd = layer(2.0);
        odd.insert("extra", Tensor::zeros(&[1]));
        assert!(StackedWeights::from_layers(&[layer(1.0), odd]).is_err());
    }
}
