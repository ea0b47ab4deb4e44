//! ringpipe-run binary — synthetic end-to-end pipeline harness.
//!
//! ```bash
//! # 4 stages, 8 microbatches, 2 repeats (8 logical layers), checked
//! # against the sequential reference
//! RUST_LOG=info cargo run --bin ringpipe-run -- run --stages 4 --microbatches 8 --repeats 2
//!
//! # Print the schedule grid instead of running compute
//! cargo run --bin ringpipe-run -- grid --stages 2 --microbatches 4 --repeats 2
//! ```

use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ringpipe_engine::{schedule, LayerWeights, Pipeline, StackedWeights};
use ringpipe_types::{ExecutionMode, PipelineConfig, Tensor};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "ringpipe-run",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Circular pipeline-parallel microbatch engine — demo harness"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Physical pipeline stages.
    #[arg(long, global = true, default_value_t = 4)]
    stages: u32,

    /// Microbatches (must be divisible by --stages).
    #[arg(long, global = true, default_value_t = 8)]
    microbatches: u32,

    /// Circuits of the physical stages (logical layers = stages × repeats).
    #[arg(long, global = true, default_value_t = 1)]
    repeats: u32,

    /// Examples per microbatch.
    #[arg(long, global = true, default_value_t = 2)]
    microbatch_size: u32,

    /// Sequence length.
    #[arg(long, global = true, default_value_t = 16)]
    seq_len: u32,

    /// Embedding dimension.
    #[arg(long, global = true, default_value_t = 8)]
    emb_dim: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Run one forward pass with affine layers and verify the result
    /// against sequentially applied layers.
    Run,

    /// Print the per-iteration schedule grid (stage → microbatch/layer).
    Grid,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig {
        num_decoder_layers: cli.stages * cli.repeats,
        ici_pipeline_parallelism: cli.stages,
        dcn_pipeline_parallelism: 1,
        num_pipeline_repeats: cli.repeats,
        num_pipeline_microbatches: cli.microbatches,
        global_batch_size: cli.microbatches * cli.microbatch_size,
        max_target_length: cli.seq_len,
        emb_dim: cli.emb_dim,
    };

    match cli.command {
        Command::Run => run_forward(&config),
        Command::Grid => print_grid(&config),
    }
}

// ── Forward pass ──────────────────────────────────────────────────────────────

fn run_forward(config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let geom = *pipeline.geometry();

    let layer_params: Vec<(f32, f32)> = (0..geom.num_layers)
        .map(|l| (1.0 + 0.01 * l as f32, 0.1 * l as f32))
        .collect();
    let weights = affine_weights(&layer_params)?;

    let batch_shape = [
        geom.global_batch_size,
        config.max_target_length as usize,
        config.emb_dim as usize,
    ];
    let inputs = synthetic_batch(&batch_shape)?;
    let positions = position_ids(geom.global_batch_size, config.max_target_length as usize)?;

    let started = Instant::now();
    let output = pipeline.run(
        &affine_stage,
        &weights,
        &inputs,
        Some(&positions),
        None,
        true,
        ExecutionMode::Train,
    )?;
    let elapsed = started.elapsed();

    let expected = sequential_reference(&inputs, &layer_params);
    if output != expected {
        bail!("pipeline output diverged from the sequential reference");
    }

    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        total_iterations = geom.total_iterations,
        bubble_invocations = geom.bubble_invocations(),
        efficiency = geom.efficiency(),
        "forward pass verified against sequential reference"
    );
    Ok(())
}

/// `out = in · scale + bias`, the per-layer parameters read from leaves.
fn affine_stage(
    weights: &LayerWeights,
    input: &Tensor,
    _positions: Option<&Tensor>,
    _segment_ids: Option<&Tensor>,
    _deterministic: bool,
    _mode: ExecutionMode,
) -> ringpipe_engine::Result<Tensor> {
    let scale = weights.leaf("scale")?.data()[0];
    let bias = weights.leaf("bias")?.data()[0];
    let mut out = input.clone();
    out.data_mut().iter_mut().for_each(|v| *v = *v * scale + bias);
    Ok(out)
}

fn affine_weights(layer_params: &[(f32, f32)]) -> Result<StackedWeights> {
    let layers: Vec<LayerWeights> = layer_params
        .iter()
        .map(|&(scale, bias)| {
            let mut w = LayerWeights::new();
            w.insert("scale", Tensor::from_vec(vec![1], vec![scale])?);
            w.insert("bias", Tensor::from_vec(vec![1], vec![bias])?);
            Ok(w)
        })
        .collect::<Result<_>>()?;
    Ok(StackedWeights::from_layers(&layers)?)
}

/// Deterministic pseudo-data; no RNG needed for a correctness harness.
fn synthetic_batch(shape: &[usize]) -> Result<Tensor> {
    let len: usize = shape.iter().product();
    let data = (0..len).map(|v| ((v % 17) as f32 - 8.0) * 0.25).collect();
    Ok(Tensor::from_vec(shape.to_vec(), data)?)
}

fn position_ids(batch: usize, seq_len: usize) -> Result<Tensor> {
    let data = (0..batch * seq_len).map(|v| (v % seq_len) as f32).collect();
    Ok(Tensor::from_vec(vec![batch, seq_len], data)?)
}

fn sequential_reference(inputs: &Tensor, layer_params: &[(f32, f32)]) -> Tensor {
    let mut out = inputs.clone();
    for &(scale, bias) in layer_params {
        out.data_mut().iter_mut().for_each(|v| *v = *v * scale + bias);
    }
    out
}

// ── Schedule grid ─────────────────────────────────────────────────────────────

fn print_grid(config: &PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let geom = pipeline.geometry();

    println!(
        "stages={} microbatches={} repeats={} iterations={} efficiency={:.3}",
        geom.num_stages,
        geom.num_microbatches,
        geom.num_repeats,
        geom.total_iterations,
        geom.efficiency()
    );
    for iteration in 0..geom.total_iterations {
        let cells = schedule::assignments_at(geom, iteration);
        let row: Vec<String> = cells
            .iter()
            .map(|c| {
                if c.active {
                    format!("m{}/L{}", c.microbatch, c.layer)
                } else {
                    "  --  ".into()
                }
            })
            .collect();
        println!("t={iteration:>3}  {}", row.join("  "));
    }
    Ok(())
}
