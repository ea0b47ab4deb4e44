//! Derived pipeline geometry and construction-time validation.
//!
//! Every structural precondition of the schedule is checked exactly once
//! here, before any buffer is allocated. Violations are configuration
//! errors — there is no runtime recovery path once the loop starts.

use serde::{Deserialize, Serialize};

use ringpipe_types::PipelineConfig;

use crate::error::{PipelineError, Result};

/// Static quantities derived from a validated [`PipelineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineGeometry {
    /// Physical execution slots (`ici × dcn`).
    pub num_stages: usize,
    /// Total logical layers (`num_stages × num_repeats`).
    pub num_layers: usize,
    /// Circuits of the physical stages.
    pub num_repeats: usize,
    /// Microbatches the global batch is split into.
    pub num_microbatches: usize,
    /// Rotating state_io slots per stage (`M / S`).
    pub microbatches_per_stage: usize,
    /// Examples per microbatch (`global_batch / M`).
    pub microbatch_size: usize,
    /// Leading dimension of the raw inputs.
    pub global_batch_size: usize,
    /// Secondary storage tier is required: outputs awaiting the next
    /// repeat outnumber what the shift register can hold.
    pub use_circ_storage: bool,
    /// Fixed loop length: `M·R + S − 1`.
    pub total_iterations: usize,
}

impl PipelineGeometry {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let num_stages = cfg.num_stages() as usize;
        let num_layers = cfg.num_decoder_layers as usize;
        let num_repeats = cfg.num_pipeline_repeats as usize;
        let num_microbatches = cfg.num_pipeline_microbatches as usize;
        let global_batch_size = cfg.global_batch_size as usize;

        if num_stages == 0 {
            return Err(PipelineError::Config(format!(
                "pipeline parallelism must be positive, got ici={} dcn={}",
                cfg.ici_pipeline_parallelism, cfg.dcn_pipeline_parallelism
            )));
        }
        if num_repeats == 0 {
            return Err(PipelineError::Config(
                "num_pipeline_repeats must be at least 1".into(),
            ));
        }
        if num_microbatches == 0 {
            return Err(PipelineError::Config(
                "num_pipeline_microbatches must be at least 1".into(),
            ));
        }

        // Exactly one layer per stage per repeat.
        if num_layers != num_stages * num_repeats {
            return Err(PipelineError::Config(format!(
                "one layer per stage per repeat required: {num_layers} layers \
                 with {num_stages} stages × {num_repeats} repeats"
            )));
        }
        if num_microbatches % num_stages != 0 {
            return Err(PipelineError::Config(format!(
                "num_microbatches ({num_microbatches}) must be divisible by \
                 num_stages ({num_stages})"
            )));
        }
        if global_batch_size % num_microbatches != 0 {
            return Err(PipelineError::Config(format!(
                "global_batch_size ({global_batch_size}) must be divisible by \
                 num_microbatches ({num_microbatches})"
            )));
        }

        Ok(Self {
            num_stages,
            num_layers,
            num_repeats,
            num_microbatches,
            microbatches_per_stage: num_microbatches / num_stages,
            microbatch_size: global_batch_size / num_microbatches,
            global_batch_size,
            use_circ_storage: num_repeats > 1 && num_microbatches > num_stages,
            total_iterations: num_microbatches * num_repeats + num_stages - 1,
        })
    }

    // ── Utilization ──────────────────────────────────────────────────────

    /// Stage invocations across the whole loop, useful or not.
    pub fn total_invocations(&self) -> usize {
        self.num_stages * self.total_iterations
    }

    /// Invocations that process real (non-bubble) work.
    pub fn useful_invocations(&self) -> usize {
        self.num_stages * self.num_microbatches * self.num_repeats
    }

    /// Fill/drain cells where a stage holds padding work.
    pub fn bubble_invocations(&self) -> usize {
        self.total_invocations() - self.useful_invocations()
    }

    /// Ratio of useful work to total grid cells.
    pub fn efficiency(&self) -> f64 {
        self.useful_invocations() as f64 / self.total_invocations() as f64
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(layers: u32, stages: u32, repeats: u32, micro: u32, batch: u32) -> PipelineConfig {
        PipelineConfig {
            num_decoder_layers: layers,
            ici_pipeline_parallelism: stages,
            dcn_pipeline_parallelism: 1,
            num_pipeline_repeats: repeats,
            num_pipeline_microbatches: micro,
            global_batch_size: batch,
            max_target_length: 4,
            emb_dim: 2,
        }
    }

    #[test]
    fn derives_quantities() {
        let g = PipelineGeometry::from_config(&cfg(8, 4, 2, 8, 16)).unwrap();
        assert_eq!(g.num_stages, 4);
        assert_eq!(g.microbatches_per_stage, 2);
        assert_eq!(g.microbatch_size, 2);
        assert_eq!(g.total_iterations, 8 * 2 + 4 - 1);
        assert!(g.use_circ_storage);
    }

    #[test]
    fn rejects_layers_per_stage_above_one() {
        let err = PipelineGeometry::from_config(&cfg(16, 4, 2, 8, 16)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("16 layers"), "{msg}");
        assert!(msg.contains("4 stages"), "{msg}");
    }

    #[test]
    fn rejects_indivisible_microbatches() {
        let err = PipelineGeometry::from_config(&cfg(4, 4, 1, 6, 12)).unwrap_err();
        assert!(err.to_string().contains("divisible"));
    }

    #[test]
    fn rejects_indivisible_global_batch() {
        let err = PipelineGeometry::from_config(&cfg(4, 4, 1, 4, 6)).unwrap_err();
        assert!(err.to_string().contains("global_batch_size"));
    }

    #[test]
    fn circ_storage_truth_table() {
        // repeats > 1 and microbatches > stages
        assert!(PipelineGeometry::from_config(&cfg(4, 2, 2, 4, 4)).unwrap().use_circ_storage);
        // repeats == 1: never, regardless of microbatch count
        assert!(!PipelineGeometry::from_config(&cfg(2, 2, 1, 8, 8)).unwrap().use_circ_storage);
        // microbatches == stages: shift register suffices
        assert!(!PipelineGeometry::from_config(&cfg(4, 2, 2, 2, 4)).unwrap().use_circ_storage);
    }

    #[test]
    fn bubble_is_stages_times_stages_minus_one() {
        for (l, s, r, m) in [(2, 2, 1, 2), (4, 2, 2, 4), (3, 3, 1, 6), (8, 4, 2, 8)] {
            let g = PipelineGeometry::from_config(&cfg(l, s, r, m, m * 2)).unwrap();
            assert_eq!(g.bubble_invocations(), g.num_stages * (g.num_stages - 1));
        }
    }

    #[test]
    fn geometry_serde_round_trip() {
        let g = PipelineGeometry::from_config(&cfg(4, 2, 2, 4, 8)).unwrap();
        let json = serde_json::to_string(&g).unwrap();
        let round: PipelineGeometry = serde_json::from_str(&json).unwrap();
        assert_eq!(g, round);
    }

    #[test]
    fn single_stage_is_fully_efficient() {
        let g = PipelineGeometry::from_config(&cfg(1, 1, 1, 4, 4)).unwrap();
        assert_eq!(g.efficiency(), 1.0);
        assert_eq!(g.bubble_invocations(), 0);
    }
}
