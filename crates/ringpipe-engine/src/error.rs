use ringpipe_types::TensorError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("shape error: {0}")]
    Shape(String),

    #[error("weights error: {0}")]
    Weights(String),

    #[error("stage {stage} failed: {message}")]
    Stage { stage: usize, message: String },

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
