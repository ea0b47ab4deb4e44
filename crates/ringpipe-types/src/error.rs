#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("shape {shape:?} implies {expected} elements, got {actual}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("cannot reshape {elements} elements into {shape:?}")]
    BadReshape { shape: Vec<usize>, elements: usize },

    #[error("cannot stack: tensor {index} has shape {shape:?}, expected {expected:?}")]
    StackShapeMismatch {
        index: usize,
        shape: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("cannot stack an empty list of tensors")]
    EmptyStack,
}
