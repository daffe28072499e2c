//! Coordinate-list tensors produced by evaluation, and their conversion to assembled forms.
use crate::error::SampleError;
use itertools::izip;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Serialize};

/// A tensor of arbitrary rank in coordinate-list form.
///
/// Entry `k` has the value `values[k]` at the multi-index `(indices[0][k], indices[1][k], ...)`.
/// Entries may be repeated, in which case their values are summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseTensor {
    shape: Vec<usize>,
    // One index array per axis
    indices: Vec<Vec<usize>>,
    values: Vec<f64>,
}

impl SparseTensor {
    pub fn try_from_parts(shape: Vec<usize>, indices: Vec<Vec<usize>>, values: Vec<f64>) -> Result<Self, SampleError> {
        if indices.len() != shape.len() {
            return Err(SampleError::ShapeMismatch {
                left: shape,
                right: vec![indices.len()],
            });
        }
        for (axis_indices, &len) in indices.iter().zip(&shape) {
            if axis_indices.len() != values.len() {
                return Err(SampleError::ShapeMismatch {
                    left: vec![values.len()],
                    right: vec![axis_indices.len()],
                });
            }
            if let Some(&index) = axis_indices.iter().find(|&&i| i >= len) {
                return Err(SampleError::IndexOutOfRange { index, len });
            }
        }
        Ok(Self { shape, indices, values })
    }

    /// All entries of a dense array, including zeros.
    pub fn from_dense(array: &ArrayD<f64>) -> Self {
        let shape = array.shape().to_vec();
        let mut indices = vec![Vec::with_capacity(array.len()); shape.len()];
        let mut values = Vec::with_capacity(array.len());
        for (index, &value) in array.indexed_iter() {
            for (axis_indices, &i) in indices.iter_mut().zip(index.slice()) {
                axis_indices.push(i);
            }
            values.push(value);
        }
        Self { shape, indices, values }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The number of stored entries, counting duplicates.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn indices(&self, axis: usize) -> &[usize] {
        &self.indices[axis]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn multi_index(&self, k: usize) -> Vec<usize> {
        self.indices.iter().map(|axis_indices| axis_indices[k]).collect()
    }

    pub fn to_dense(&self) -> ArrayD<f64> {
        let mut dense = ArrayD::zeros(IxDyn(&self.shape));
        for (k, &value) in self.values.iter().enumerate() {
            dense[IxDyn(&self.multi_index(k))] += value;
        }
        dense
    }

    /// Sorts the entries lexicographically by index and sums duplicates.
    pub fn dedup(&self) -> Self {
        let mut order: Vec<usize> = (0..self.nnz()).collect();
        order.sort_by_cached_key(|&k| self.multi_index(k));

        let mut indices = vec![Vec::new(); self.ndim()];
        let mut values: Vec<f64> = Vec::new();
        let mut previous: Option<Vec<usize>> = None;
        for k in order {
            let index = self.multi_index(k);
            if previous.as_ref() == Some(&index) {
                *values
                    .last_mut()
                    .expect("Internal error: A previous entry exists") += self.values[k];
            } else {
                for (axis_indices, &i) in indices.iter_mut().zip(&index) {
                    axis_indices.push(i);
                }
                values.push(self.values[k]);
                previous = Some(index);
            }
        }
        Self {
            shape: self.shape.clone(),
            indices,
            values,
        }
    }

    /// Removes all entries whose value is zero.
    pub fn prune(&self) -> Self {
        let keep: Vec<usize> = (0..self.nnz()).filter(|&k| self.values[k] != 0.0).collect();
        Self {
            shape: self.shape.clone(),
            indices: self
                .indices
                .iter()
                .map(|axis_indices| keep.iter().map(|&k| axis_indices[k]).collect())
                .collect(),
            values: keep.iter().map(|&k| self.values[k]).collect(),
        }
    }

    /// Converts a rank 2 tensor into a CSR matrix, summing duplicates.
    pub fn to_csr(&self) -> Result<CsrMatrix<f64>, SampleError> {
        if self.ndim() != 2 {
            return Err(SampleError::ShapeMismatch {
                left: self.shape.clone(),
                right: vec![0, 0],
            });
        }
        let mut coo = CooMatrix::new(self.shape[0], self.shape[1]);
        for (&i, &j, &v) in izip!(&self.indices[0], &self.indices[1], &self.values) {
            coo.push(i, j, v);
        }
        Ok(CsrMatrix::from(&coo))
    }

    /// Converts the tensor into the representation that suits its rank.
    pub fn assemble(&self) -> Result<Assembled, SampleError> {
        match self.ndim() {
            0 | 1 => Ok(Assembled::Dense(self.to_dense())),
            2 => Ok(Assembled::Matrix(self.to_csr()?)),
            _ => Ok(Assembled::Sparse(self.dedup().prune())),
        }
    }
}

/// An evaluated result in the representation suited to its rank.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    /// Scalars and vectors.
    Dense(ArrayD<f64>),
    /// Rank 2 results.
    Matrix(CsrMatrix<f64>),
    /// Results of rank 3 or more, with duplicates summed and zeros removed.
    Sparse(SparseTensor),
}

impl Assembled {
    pub fn as_dense(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Dense(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&CsrMatrix<f64>> {
        match self {
            Self::Matrix(matrix) => Some(matrix),
            _ => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseTensor> {
        match self {
            Self::Sparse(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// The result as a dense array, regardless of representation.
    pub fn to_dense(&self) -> ArrayD<f64> {
        match self {
            Self::Dense(array) => array.clone(),
            Self::Matrix(matrix) => {
                let mut dense = ArrayD::zeros(IxDyn(&[matrix.nrows(), matrix.ncols()]));
                for (i, j, &v) in matrix.triplet_iter() {
                    dense[IxDyn(&[i, j])] += v;
                }
                dense
            }
            Self::Sparse(tensor) => tensor.to_dense(),
        }
    }
}
