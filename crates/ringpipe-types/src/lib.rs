pub mod config;
pub mod error;
pub mod mode;
pub mod tensor;

pub use config::PipelineConfig;
pub use error::TensorError;
pub use mode::ExecutionMode;
pub use tensor::Tensor;
