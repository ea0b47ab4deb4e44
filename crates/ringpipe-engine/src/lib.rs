//! `ringpipe-engine` — circular pipeline-parallel microbatch scheduling.
//!
//! This crate is a **scheduling layer**, not a compute layer. The actual
//! layer transform (attention, MLP, …) is supplied by the caller as an
//! opaque [`StageFn`]. The engine decides which microbatch and which
//! logical layer each stage processes at every iteration, rotates the
//! hand-off buffers between iterations, and de-permutes the final
//! output back into input order.
//!
//! # Schedule
//!
//! ```text
//! Time →   0    1    2    3    4    5      S = 3 stages
//! S0:     [m0] [m1] [m2] [m3]               M = 4 microbatches
//! S1:          [m0] [m1] [m2] [m3]          R = 1 repeat
//! S2:               [m0] [m1] [m2] [m3]
//!
//! total iterations = M·R + S − 1; fill/drain bubble = S·(S − 1) cells
//! ```
//!
//! With `R > 1` the same physical stages are reused for later layer
//! groups; finished outputs re-enter stage 0 either through the shift
//! register or, when `M > S`, through a secondary circular store.

pub mod buffers;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod schedule;
pub mod stage;
pub mod step;
pub mod weights;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use buffers::LoopState;
pub use driver::Pipeline;
pub use error::{PipelineError, Result};
pub use geometry::PipelineGeometry;
pub use schedule::StageAssignment;
pub use stage::StageFn;
pub use weights::{LayerWeights, StackedWeights, StageWeights};

pub use ringpipe_types::{ExecutionMode, PipelineConfig, Tensor};
