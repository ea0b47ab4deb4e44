// Static pipeline configuration. All knobs are resolved before the
// engine runs; derived quantities live in ringpipe-engine's geometry.

use serde::{Deserialize, Serialize};

/// Integer knobs describing one pipeline-parallel forward pass.
///
/// The engine treats these as read-only. Validation (divisibility,
/// layers-per-stage) happens once at `Pipeline::new`, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total logical decoder layers. Must equal
    /// `num_stages × num_pipeline_repeats` (one layer per stage per repeat).
    pub num_decoder_layers: u32,
    /// Pipeline-parallel degree over the fast (intra-slice) interconnect.
    pub ici_pipeline_parallelism: u32,
    /// Pipeline-parallel degree over the slow (cross-slice) interconnect.
    pub dcn_pipeline_parallelism: u32,
    /// Full circuits of the physical stages. 1 = plain (non-circular) pipeline.
    pub num_pipeline_repeats: u32,
    /// Microbatches the global batch is split into.
    pub num_pipeline_microbatches: u32,
    /// Leading dimension of the raw input batch.
    pub global_batch_size: u32,
    /// Sequence length of each example.
    pub max_target_length: u32,
    /// Embedding (feature) dimension of the activations.
    pub emb_dim: u32,
}

impl PipelineConfig {
    /// Physical execution slots: `ici × dcn`.
    pub fn num_stages(&self) -> u32 {
        self.ici_pipeline_parallelism * self.dcn_pipeline_parallelism
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_decoder_layers: 4,
            ici_pipeline_parallelism: 4,
            dcn_pipeline_parallelism: 1,
            num_pipeline_repeats: 1,
            num_pipeline_microbatches: 8,
            global_batch_size: 8,
            max_target_length: 128,
            emb_dim: 16,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
