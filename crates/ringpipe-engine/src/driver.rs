//! The pipeline driver: owns the fixed-length iteration loop.
//!
//! One forward pass = reshape to microbatch-major → init buffers →
//! `total_iterations` strictly sequential ticks → de-permute → reshape
//! back to batch-major. Every shape precondition is checked before the
//! first iteration; nothing inside the loop can fail for configuration
//! reasons.

use tracing::info;

use ringpipe_types::{ExecutionMode, PipelineConfig, Tensor};

use crate::buffers::LoopState;
use crate::error::{PipelineError, Result};
use crate::geometry::PipelineGeometry;
use crate::schedule;
use crate::stage::StageFn;
use crate::step;
use crate::weights::StackedWeights;

#[derive(Debug)]
pub struct Pipeline {
    geometry: PipelineGeometry,
}

impl Pipeline {
    /// Validate the configuration and derive the schedule geometry.
    /// All structural errors surface here, before any buffer exists.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            geometry: PipelineGeometry::from_config(config)?,
        })
    }

    pub fn geometry(&self) -> &PipelineGeometry {
        &self.geometry
    }

    /// Run one full forward pass.
    ///
    /// `inputs` is batch-major `[global_batch, …]`; `positions` and
    /// `segment_ids`, when supplied, share its leading dimension. The
    /// output is batch-major with `inputs`' exact shape, in original
    /// microbatch order.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        stage_fn: &dyn StageFn,
        weights: &StackedWeights,
        inputs: &Tensor,
        positions: Option<&Tensor>,
        segment_ids: Option<&Tensor>,
        deterministic: bool,
        mode: ExecutionMode,
    ) -> Result<Tensor> {
        let geom = &self.geometry;

        weights.validate_num_layers(geom.num_layers)?;
        let batch_shape = inputs.shape().to_vec();
        let inputs = self.to_microbatch_major(inputs, "inputs")?;
        let positions = positions
            .map(|p| self.to_microbatch_major(p, "positions"))
            .transpose()?;
        let segment_ids = segment_ids
            .map(|s| self.to_microbatch_major(s, "segment_ids"))
            .transpose()?;

        let mut state = LoopState::init(geom, &inputs)?;

        info!(
            num_stages = geom.num_stages,
            num_repeats = geom.num_repeats,
            num_microbatches = geom.num_microbatches,
            total_iterations = geom.total_iterations,
            use_circ_storage = geom.use_circ_storage,
            efficiency = geom.efficiency(),
            mode = %mode,
            "starting pipeline loop"
        );

        // Strictly sequential: every read in iteration i+1 depends on a
        // write from iteration i.
        for iteration in 0..geom.total_iterations {
            state = step::run_one_iteration(
                &state,
                geom,
                iteration,
                weights,
                positions.as_ref(),
                segment_ids.as_ref(),
                stage_fn,
                deterministic,
                mode,
            )?;
        }

        let permutation = schedule::output_permutation(geom);
        let output = state
            .state_io
            .permute_slots(&permutation)
            .reshape(batch_shape)?;

        info!("pipeline loop finished");
        Ok(output)
    }

    /// `[global_batch, rest…] → [num_microbatches, microbatch_size, rest…]`.
    fn to_microbatch_major(&self, array: &Tensor, name: &str) -> Result<Tensor> {
        let geom = &self.geometry;
        let dim0 = array.shape().first().copied().unwrap_or(0);
        if dim0 != geom.global_batch_size {
            return Err(PipelineError::Shape(format!(
                "{name} has leading dimension {dim0}, expected \
                 global_batch_size = {}",
                geom.global_batch_size
            )));
        }
        let mut shape = vec![geom.num_microbatches, geom.microbatch_size];
        shape.extend_from_slice(&array.shape()[1..]);
        Ok(array.clone().reshape(shape)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
