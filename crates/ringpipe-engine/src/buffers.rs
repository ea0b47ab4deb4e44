//! The four rotating storage buffers and their per-iteration updates.
//!
//! ```text
//! state_io  [S, M/S, micro…]  ring of fresh inputs / finished outputs
//! shift     [S, micro…]       stage i−1's output → stage i's next input
//! circ      [S, M, micro…]    outputs parked for the next repeat   (optional)
//! mover     [S, micro…]       one-iteration staging copy for circ  (optional)
//! ```
//!
//! Updates use immutable hand-off: [`LoopState::advance`] consumes
//! nothing and returns a freshly built state, so no iteration ever
//! observes a partially written buffer.

use ringpipe_types::Tensor;

use crate::error::{PipelineError, Result};
use crate::geometry::PipelineGeometry;

#[derive(Debug, Clone)]
pub struct LoopState {
    /// `[num_stages, microbatches_per_stage, micro…]` — holds reshaped
    /// inputs at creation and the (permuted) final outputs at the end.
    pub state_io: Tensor,
    /// `[num_stages, micro…]` — previous iteration's outputs rotated by
    /// one stage position.
    pub shift: Tensor,
    /// `[num_stages, num_microbatches, micro…]` iff circular storage is
    /// enabled, else `None` (never allocated).
    pub circ_storage: Option<Tensor>,
    /// Previous iteration's full stage output, written into circular
    /// storage one iteration late so the write can overlap compute.
    pub circ_storage_mover: Option<Tensor>,
}

impl LoopState {
    /// Build the initial buffers from microbatch-major inputs
    /// `[num_microbatches, microbatch_size, …]`.
    pub fn init(geom: &PipelineGeometry, inputs: &Tensor) -> Result<Self> {
        let dim0 = inputs.shape().first().copied().unwrap_or(0);
        if dim0 != geom.num_microbatches {
            return Err(PipelineError::Shape(format!(
                "inputs have leading dimension {dim0}, expected \
                 num_microbatches = {}",
                geom.num_microbatches
            )));
        }

        let micro_shape = &inputs.shape()[1..];

        let mut shift_shape = vec![geom.num_stages];
        shift_shape.extend_from_slice(micro_shape);
        let shift = Tensor::zeros(&shift_shape);

        let mut state_io_shape = vec![geom.num_stages, geom.microbatches_per_stage];
        state_io_shape.extend_from_slice(micro_shape);
        let state_io = inputs.clone().reshape(state_io_shape)?;

        let (circ_storage, circ_storage_mover) = if geom.use_circ_storage {
            let mut circ_shape = vec![geom.num_stages, geom.num_microbatches];
            circ_shape.extend_from_slice(micro_shape);
            (Some(Tensor::zeros(&circ_shape)), Some(shift.clone()))
        } else {
            (None, None)
        };

        Ok(Self {
            state_io,
            shift,
            circ_storage,
            circ_storage_mover,
        })
    }

    /// Per-stage inputs for one iteration, shape `[num_stages, micro…]`.
    ///
    /// Stage 0 draws fresh data from state_io on the first circuit and
    /// recycled data (circular storage, or the shift register itself)
    /// afterwards; stages 1… always receive the previous stage's last
    /// output via the shift register.
    pub fn iteration_inputs(&self, geom: &PipelineGeometry, iteration: usize) -> Tensor {
        let state_io_slice = self.state_io.slot(iteration % geom.microbatches_per_stage);

        let recycled = match &self.circ_storage {
            Some(circ) => circ.slot(iteration % geom.num_microbatches),
            None => self.shift.clone(),
        };

        let raw = if iteration < geom.num_microbatches {
            state_io_slice
        } else {
            recycled
        };

        let mut stages_in = self.shift.clone();
        stages_in.set_row(0, &raw.row(0));
        stages_in
    }

    /// Fold one iteration's stage output `[num_stages, micro…]` into the
    /// next state.
    pub fn advance(&self, geom: &PipelineGeometry, iteration: usize, output: &Tensor) -> LoopState {
        let stages = geom.num_stages;

        // Stage S−1's output wraps around to stage 0's input position.
        let new_shift = output.rotate_right();

        let (new_circ, new_mover) = match (&self.circ_storage, &self.circ_storage_mover) {
            (Some(circ), Some(mover)) => {
                // The mover holds the PREVIOUS iteration's output, hence
                // the extra −1 in the slot offset.
                let offset = (iteration as i64 - stages as i64)
                    .rem_euclid(geom.num_microbatches as i64)
                    as usize;
                let mut circ = circ.clone();
                circ.put_slot(offset, &mover.rotate_right());
                (Some(circ), Some(output.clone()))
            }
            _ => (None, None),
        };

        // Push the finished last-stage output into the ring slot and
        // evict the now-stale leading entry.
        let slot = iteration % geom.microbatches_per_stage;
        let stream = self.state_io.slot(slot);
        let mut shifted = stream.clone();
        for s in 0..stages - 1 {
            shifted.set_row(s, &stream.row(s + 1));
        }
        shifted.set_row(stages - 1, &output.row(stages - 1));

        let mut new_state_io = self.state_io.clone();
        new_state_io.put_slot(slot, &shifted);

        LoopState {
            state_io: new_state_io,
            shift: new_shift,
            circ_storage: new_circ,
            circ_storage_mover: new_mover,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
