//! One pipeline tick: gather, compute all stages in parallel, scatter.

use rayon::prelude::*;

use ringpipe_types::{ExecutionMode, Tensor};

use crate::buffers::LoopState;
use crate::error::{PipelineError, Result};
use crate::geometry::PipelineGeometry;
use crate::schedule;
use crate::stage::StageFn;
use crate::weights::StackedWeights;

/// Rows of a microbatch-major array `[M, …]` gathered into stage-major
/// order `[S, …]` using each stage's current microbatch id. Used for
/// positions and segment ids, never for activations.
fn gather_microbatch_rows(
    geom: &PipelineGeometry,
    array: &Tensor,
    iteration: usize,
) -> Result<Tensor> {
    let rows: Vec<Tensor> = (0..geom.num_stages)
        .map(|s| array.row(schedule::microbatch_id(geom, s, iteration)))
        .collect();
    Ok(Tensor::stack(&rows)?)
}

/// Run one loop iteration: slice per-stage weights and inputs, apply the
/// stage function to every stage concurrently, and fold the combined
/// output back into the rotating buffers.
#[allow(clippy::too_many_arguments)]
pub fn run_one_iteration(
    state: &LoopState,
    geom: &PipelineGeometry,
    iteration: usize,
    weights: &StackedWeights,
    positions: Option<&Tensor>,
    segment_ids: Option<&Tensor>,
    stage_fn: &dyn StageFn,
    deterministic: bool,
    mode: ExecutionMode,
) -> Result<LoopState> {
    let layer_ids = schedule::layer_ids(geom, iteration);
    let stage_weights = weights.select_layers(&layer_ids)?;

    let stages_in = state.iteration_inputs(geom, iteration);

    let stages_positions = positions
        .map(|p| gather_microbatch_rows(geom, p, iteration))
        .transpose()?;
    let stages_segment_ids = segment_ids
        .map(|s| gather_microbatch_rows(geom, s, iteration))
        .transpose()?;

    // Stages are mutually independent within an iteration; the barrier
    // is the collect below.
    let outputs: Vec<Tensor> = (0..geom.num_stages)
        .into_par_iter()
        .map(|s| {
            stage_fn
                .apply(
                    &stage_weights.stage(s),
                    &stages_in.row(s),
                    stages_positions.as_ref().map(|p| p.row(s)).as_ref(),
                    stages_segment_ids.as_ref().map(|t| t.row(s)).as_ref(),
                    deterministic,
                    mode,
                )
                .map_err(|e| PipelineError::Stage {
                    stage: s,
                    message: e.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    for (s, out) in outputs.iter().enumerate() {
        if out.shape() != stages_in.row(s).shape() {
            return Err(PipelineError::Shape(format!(
                "stage {s} returned shape {:?}, expected {:?}",
                out.shape(),
                stages_in.row(s).shape()
            )));
        }
    }

    let output = Tensor::stack(&outputs)?;
    Ok(state.advance(geom, iteration, &output))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
