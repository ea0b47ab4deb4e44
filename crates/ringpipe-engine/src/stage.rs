//! The external stage-compute contract.
//!
//! The engine never looks inside a layer transform. It hands each stage
//! its own single-layer weights and activation row and expects an
//! activation of identical shape back. Implementations must be pure
//! with respect to other stages — all stages of one iteration are
//! invoked concurrently.

use ringpipe_types::{ExecutionMode, Tensor};

use crate::error::Result;
use crate::weights::LayerWeights;

/// One logical layer transform, invocable independently per stage.
///
/// `Sync` because the engine maps stages across threads within an
/// iteration; the iteration loop itself stays sequential.
pub trait StageFn: Sync {
    /// Transform one stage's activation.
    ///
    /// `positions` and `segment_ids` are handed through when the caller
    /// supplied them to [`crate::Pipeline::run`], otherwise `None` — no
    /// sentinel values. The returned tensor must have `input`'s shape.
    fn apply(
        &self,
        weights: &LayerWeights,
        input: &Tensor,
        positions: Option<&Tensor>,
        segment_ids: Option<&Tensor>,
        deterministic: bool,
        mode: ExecutionMode,
    ) -> Result<Tensor>;
}

impl<F> StageFn for F
where
    F: Fn(
            &LayerWeights,
            &Tensor,
            Option<&Tensor>,
            Option<&Tensor>,
            bool,
            ExecutionMode,
        ) -> Result<Tensor>
        + Sync,
{
    fn apply(
        &self,
        weights: &LayerWeights,
        input: &Tensor,
        positions: Option<&Tensor>,
        segment_ids: Option<&Tensor>,
        deterministic: bool,
        mode: ExecutionMode,
    ) -> Result<Tensor> {
        self(weights, input, positions, segment_ids, deterministic, mode)
    }
}
