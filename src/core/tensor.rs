//! Flat numeric tensors carried by signals and KPI records.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tensor shape. Almost every signal is rank 0..=3, so it stays inline.
pub type Shape = SmallVec<[usize; 4]>;

/// Row-major tensor of `f32` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Flattened tensor data (row-major order).
    pub data: Vec<f32>,

    /// Shape of the tensor. Empty for scalars.
    pub shape: Shape,
}

impl Tensor {
    /// Create a new tensor.
    pub fn new(data: Vec<f32>, shape: &[usize]) -> Self {
        let shape = Shape::from_slice(shape);
        debug_assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Tensor length must match shape product"
        );
        Self { data, shape }
    }

    /// Create a rank-0 tensor.
    pub fn scalar(value: f32) -> Self {
        Self {
            data: vec![value],
            shape: Shape::new(),
        }
    }

    /// Create a rank-1 tensor.
    pub fn vector(data: Vec<f32>) -> Self {
        let mut shape = Shape::new();
        shape.push(data.len());
        Self { data, shape }
    }

    /// Create a zero-filled tensor with the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let shape = Shape::from_slice(shape);
        let size = shape.iter().product();
        Self {
            data: vec![0.0; size],
            shape,
        }
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get element at a flat index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.data.get(index).copied()
    }

    /// The single value of a one-element tensor.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f32> {
        match self.data.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }
}

impl From<f32> for Tensor {
    fn from(value: f32) -> Self {
        Self::scalar(value)
    }
}
