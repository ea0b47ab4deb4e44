//! Pure schedule functions: which microbatch and which logical layer a
//! stage holds at a given loop iteration.
//!
//! Everything here is computed from `(stage, iteration)` and the static
//! geometry alone — no buffer state is consulted. The buffer rotations
//! in [`crate::buffers`] are designed so that the data each stage holds
//! at iteration `i` is exactly the microbatch these functions name.

use serde::{Deserialize, Serialize};

use crate::geometry::PipelineGeometry;

/// Microbatch nominally held by `stage` at `iteration`:
/// `(iteration − stage) mod M`.
///
/// Used to gather position/segment-id rows into stage-major order.
pub fn microbatch_id(geom: &PipelineGeometry, stage: usize, iteration: usize) -> usize {
    (iteration as i64 - stage as i64).rem_euclid(geom.num_microbatches as i64) as usize
}

/// Logical layer each stage computes with at `iteration`.
///
/// Stage `s` on repeat `r` runs layer `s + r·S`. The repeat index is how
/// many full microbatch circuits the stage has finished:
/// `⌊max(iteration − s, 0) / M⌋`. During the final drain iterations the
/// formula would step past the last repeat; those stages are clamped to
/// the last valid layer and their output is discarded by the write-back
/// positions, so the clamp never leaks into results.
pub fn layer_ids(geom: &PipelineGeometry, iteration: usize) -> Vec<usize> {
    (0..geom.num_stages)
        .map(|s| {
            let progress = iteration.saturating_sub(s);
            let repeat = progress / geom.num_microbatches;
            (s + repeat * geom.num_stages).min(geom.num_layers - 1)
        })
        .collect()
}

/// state_io slot where the first completed microbatch lands:
/// `(M·(R−1) + S − 1) mod microbatches_per_stage`.
pub fn first_output_land_index(geom: &PipelineGeometry) -> usize {
    let first_output_iters =
        geom.num_microbatches * (geom.num_repeats - 1) + geom.num_stages - 1;
    first_output_iters % geom.microbatches_per_stage
}

/// Permutation restoring original microbatch order on the
/// microbatches-per-stage axis: output slot `k` reads input slot
/// `(k + land_idx) mod microbatches_per_stage`.
pub fn output_permutation(geom: &PipelineGeometry) -> Vec<usize> {
    let land = first_output_land_index(geom);
    let ms = geom.microbatches_per_stage;
    (0..ms).map(|k| (k + land) % ms).collect()
}

// ── Schedule grid ────────────────────────────────────────────────────────────

/// One cell of the execution grid: what a stage holds at one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAssignment {
    pub stage: usize,
    pub microbatch: usize,
    pub layer: usize,
    /// Repeat this cell belongs to (meaningful only when `active`).
    pub repeat: usize,
    /// False during fill (stage not yet fed) and drain (all work done) —
    /// the stage computes on padding and its output is discarded.
    pub active: bool,
}

/// All per-stage assignments for one iteration. Diagnostic surface; the
/// hot path recomputes only the pieces it needs.
pub fn assignments_at(geom: &PipelineGeometry, iteration: usize) -> Vec<StageAssignment> {
    let layers = layer_ids(geom, iteration);
    (0..geom.num_stages)
        .map(|s| {
            let progress = iteration.saturating_sub(s);
            StageAssignment {
                stage: s,
                microbatch: microbatch_id(geom, s, iteration),
                layer: layers[s],
                repeat: progress / geom.num_microbatches,
                active: iteration >= s
                    && progress < geom.num_microbatches * geom.num_repeats,
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ringpipe_types::PipelineConfig;

    fn geom(stages: u32, repeats: u32, micro: u32) -> PipelineGeometry {
        PipelineGeometry::from_config(&PipelineConfig {
            num_decoder_layers: stages * repeats,
            ici_pipeline_parallelism: stages,
            dcn_pipeline_parallelism: 1,
            num_pipeline_repeats: repeats,
            num_pipeline_microbatches: micro,
            global_batch_size: micro,
            max_target_length: 1,
            emb_dim: 1,
        })
        .unwrap()
    }

    #[test]
    fn microbatch_id_staggers_by_stage() {
        let g = geom(3, 1, 6);
        assert_eq!(microbatch_id(&g, 0, 0), 0);
        assert_eq!(microbatch_id(&g, 1, 0), 5); // wraps, stage not yet fed
        assert_eq!(microbatch_id(&g, 1, 1), 0);
        assert_eq!(microbatch_id(&g, 2, 7), 5);
        assert_eq!(microbatch_id(&g, 0, 6), 0); // wraps after a full circuit
    }

    #[test]
    fn layer_ids_advance_per_repeat() {
        let g = geom(2, 2, 4);
        // Fill: every stage still on its first layer group.
        assert_eq!(layer_ids(&g, 0), vec![0, 1]);
        assert_eq!(layer_ids(&g, 3), vec![0, 1]);
        // Stage 0 enters repeat 1 at iteration M=4; stage 1 one later.
        assert_eq!(layer_ids(&g, 4), vec![2, 1]);
        assert_eq!(layer_ids(&g, 5), vec![2, 3]);
    }

    #[test]
    fn layer_ids_clamped_on_drain() {
        let g = geom(2, 2, 4);
        // Last iteration (M·R + S − 2 = 9): stage 0 would index layer 4.
        assert_eq!(layer_ids(&g, 9), vec![3, 3]);
    }

    #[test]
    fn land_index_and_permutation() {
        // S=2, M=4, R=2, ms_per_stage=2 → land = (4·1 + 1) mod 2 = 1.
        let g = geom(2, 2, 4);
        assert_eq!(first_output_land_index(&g), 1);
        assert_eq!(output_permutation(&g), vec![1, 0]);
    }

    #[test]
    fn trivial_pipeline_has_identity_permutation() {
        let g = geom(1, 1, 4);
        assert_eq!(first_output_land_index(&g), 0);
        assert_eq!(output_permutation(&g), vec![0, 1, 2, 3]);
    }

    #[test]
    fn conservation_per_stage_and_repeat() {
        // Across the loop, every stage must see each microbatch exactly
        // once per repeat — nothing dropped, nothing duplicated.
        for (s, r, m) in [(2, 2, 4), (2, 1, 2), (4, 2, 8), (1, 3, 2), (3, 1, 6)] {
            let g = geom(s, r, m);
            let mut seen =
                vec![vec![0usize; g.num_microbatches]; g.num_stages * g.num_repeats];
            for it in 0..g.total_iterations {
                for cell in assignments_at(&g, it).iter().filter(|c| c.active) {
                    seen[cell.stage * g.num_repeats + cell.repeat][cell.microbatch] += 1;
                }
            }
            for counts in &seen {
                assert!(counts.iter().all(|&c| c == 1), "S={s} R={r} M={m}: {counts:?}");
            }
        }
    }

    #[test]
    fn bubble_cells_match_geometry() {
        for (s, r, m) in [(2, 2, 4), (3, 1, 6), (4, 2, 8)] {
            let g = geom(s, r, m);
            let active: usize = (0..g.total_iterations)
                .map(|it| assignments_at(&g, it).iter().filter(|c| c.active).count())
                .sum();
            assert_eq!(active, g.useful_invocations());
            assert_eq!(g.total_invocations() - active, g.num_stages * (g.num_stages - 1));
        }
    }

    #[test]
    fn active_cells_use_unclamped_layers() {
        // The clamp may only ever fire on inactive (drain) cells.
        for (s, r, m) in [(2, 2, 4), (4, 2, 8), (3, 1, 6)] {
            let g = geom(s, r, m);
            for it in 0..g.total_iterations {
                for cell in assignments_at(&g, it).iter().filter(|c| c.active) {
                    assert_eq!(cell.layer, cell.stage + cell.repeat * g.num_stages);
                }
            }
        }
    }
}
