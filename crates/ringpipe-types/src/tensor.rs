//! Owned dense f32 tensor: a flat buffer plus an explicit shape.
//!
//! Activations move through the pipeline as raw contiguous data with
//! row-major layout; the engine only ever needs whole-row operations on
//! the two leading axes (stages, rotating slots), so this type exposes
//! exactly those and nothing more. No tensor framework dependency.

use crate::error::TensorError;

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// All-zeros tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Build from a flat row-major buffer. The buffer length must match
    /// the product of the shape.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TensorError::LengthMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Reinterpret the flat buffer under a new shape of equal element count.
    pub fn reshape(mut self, shape: Vec<usize>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if self.data.len() != expected {
            return Err(TensorError::BadReshape {
                shape,
                elements: self.data.len(),
            });
        }
        self.shape = shape;
        Ok(self)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Elements per axis-0 row.
    fn row_len(&self) -> usize {
        debug_assert!(!self.shape.is_empty());
        self.data.len() / self.shape[0]
    }

    // ── Axis-0 rows ──────────────────────────────────────────────────────

    /// Copy of row `i` along axis 0, with the leading axis removed.
    ///
    /// Panics if `i` is out of range or the tensor is 0-dimensional.
    pub fn row(&self, i: usize) -> Tensor {
        assert!(i < self.shape[0], "row {i} out of range {}", self.shape[0]);
        let rl = self.row_len();
        Tensor {
            shape: self.shape[1..].to_vec(),
            data: self.data[i * rl..(i + 1) * rl].to_vec(),
        }
    }

    /// Overwrite row `i` along axis 0.
    ///
    /// Panics if `i` is out of range or `src` does not match the row shape.
    pub fn set_row(&mut self, i: usize, src: &Tensor) {
        assert!(i < self.shape[0], "row {i} out of range {}", self.shape[0]);
        assert_eq!(src.shape, &self.shape[1..], "row shape mismatch");
        let rl = self.row_len();
        self.data[i * rl..(i + 1) * rl].copy_from_slice(&src.data);
    }

    /// Rotate axis 0 right by one: row `d0−1` becomes row 0, every other
    /// row moves down by one. A pure index permutation.
    pub fn rotate_right(&self) -> Tensor {
        let d0 = self.shape[0];
        let rl = self.row_len();
        let mut data = Vec::with_capacity(self.data.len());
        data.extend_from_slice(&self.data[(d0 - 1) * rl..]);
        data.extend_from_slice(&self.data[..(d0 - 1) * rl]);
        Tensor {
            shape: self.shape.clone(),
            data,
        }
    }

    // ── Axis-1 slots ─────────────────────────────────────────────────────

    /// Copy of slot `j` along axis 1: `[d0, d1, rest…] → [d0, rest…]`.
    ///
    /// Panics unless the tensor has at least two axes and `j < d1`.
    pub fn slot(&self, j: usize) -> Tensor {
        assert!(self.ndim() >= 2, "slot() needs at least 2 axes");
        let (d0, d1) = (self.shape[0], self.shape[1]);
        assert!(j < d1, "slot {j} out of range {d1}");
        let block = self.data.len() / (d0 * d1);
        let mut data = Vec::with_capacity(d0 * block);
        for i in 0..d0 {
            let start = (i * d1 + j) * block;
            data.extend_from_slice(&self.data[start..start + block]);
        }
        let mut shape = Vec::with_capacity(self.ndim() - 1);
        shape.push(d0);
        shape.extend_from_slice(&self.shape[2..]);
        Tensor { shape, data }
    }

    /// Overwrite slot `j` along axis 1 with `src` of shape `[d0, rest…]`.
    pub fn put_slot(&mut self, j: usize, src: &Tensor) {
        assert!(self.ndim() >= 2, "put_slot() needs at least 2 axes");
        let (d0, d1) = (self.shape[0], self.shape[1]);
        assert!(j < d1, "slot {j} out of range {d1}");
        let block = self.data.len() / (d0 * d1);
        assert_eq!(src.data.len(), d0 * block, "slot size mismatch");
        for i in 0..d0 {
            let start = (i * d1 + j) * block;
            self.data[start..start + block].copy_from_slice(&src.data[i * block..(i + 1) * block]);
        }
    }

    /// Reorder axis 1 by `perm`: output slot `k` is input slot `perm[k]`.
    ///
    /// Panics unless `perm` is a permutation of `0..d1`.
    pub fn permute_slots(&self, perm: &[usize]) -> Tensor {
        assert!(self.ndim() >= 2, "permute_slots() needs at least 2 axes");
        assert_eq!(perm.len(), self.shape[1], "permutation length mismatch");
        let mut out = self.clone();
        for (k, &p) in perm.iter().enumerate() {
            out.put_slot(k, &self.slot(p));
        }
        out
    }

    // ── Stacking ─────────────────────────────────────────────────────────

    /// Stack equally shaped tensors along a new leading axis.
    pub fn stack(parts: &[Tensor]) -> Result<Tensor, TensorError> {
        let first = parts.first().ok_or(TensorError::EmptyStack)?;
        let mut data = Vec::with_capacity(parts.len() * first.data.len());
        for (index, t) in parts.iter().enumerate() {
            if t.shape != first.shape {
                return Err(TensorError::StackShapeMismatch {
                    index,
                    shape: t.shape.clone(),
                    expected: first.shape.clone(),
                });
            }
            data.extend_from_slice(&t.data);
        }
        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(parts.len());
        shape.extend_from_slice(&first.shape);
        Ok(Tensor { shape, data })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
