//! Column-major multi-dimensional array container.
//!
//! All images and matrices exchanged with the cores use column-major element
//! order: in 2D, element (i, j) lives at `i + j*H`; in 3D, element (i, j, k)
//! lives at `i + j*H + k*H*W`. Higher dimensions take precedence over lower
//! ones in the element ordering.

use serde::{Deserialize, Serialize};

/// A dense multi-dimensional array in column-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Array<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

impl<T> Array<T> {
    /// Wrap existing column-major data. Panics if the data length does not
    /// match the product of the dimensions.
    pub fn from_vec(dims: Vec<usize>, data: Vec<T>) -> Self {
        let n: usize = dims.iter().product();
        assert_eq!(
            data.len(),
            n,
            "array data length {} does not match dims {:?}",
            data.len(),
            dims
        );
        Self { dims, data }
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    /// Size along each dimension.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat column-major element slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Flat index of a 2D position.
    pub fn index_2d(&self, i: usize, j: usize) -> usize {
        debug_assert_eq!(self.num_dims(), 2);
        i + j * self.dims[0]
    }

    /// Flat index of a 3D position.
    pub fn index_3d(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert_eq!(self.num_dims(), 3);
        i + j * self.dims[0] + k * self.dims[0] * self.dims[1]
    }
}

impl<T: Clone + Default> Array<T> {
    /// A zero-initialised array of the given shape.
    pub fn zeros(dims: Vec<usize>) -> Self {
        let n: usize = dims.iter().product();
        Self {
            dims,
            data: vec![T::default(); n],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
