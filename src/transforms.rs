//! Transform chains mapping element-local coordinates to named coordinate spaces.
//!
//! A [`TransformChain`] is an ordered list of affine edges, root first. Mapping element-local
//! coordinates to root coordinates applies the edges from the last one to the first one. Two
//! elements are related topologically when the chain of one is a prefix of the chain of the
//! other: the remaining *tail* maps the local coordinates of the finer element into the local
//! coordinates of the coarser one.
use crate::error::SampleError;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// An affine map `x -> A x + b` from `fromdims` to `todims` coordinates.
///
/// Coefficients are stored as ordered floats so that transforms can be compared and hashed,
/// which is what identifies elements across samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformItem {
    todims: usize,
    fromdims: usize,
    // Column-major, todims x fromdims
    linear: Vec<OrderedFloat<f64>>,
    offset: Vec<OrderedFloat<f64>>,
}

impl TransformItem {
    pub fn new(linear: &DMatrix<f64>, offset: &DVector<f64>) -> Result<Self, SampleError> {
        if linear.nrows() != offset.len() {
            return Err(SampleError::ShapeMismatch {
                left: vec![linear.nrows(), linear.ncols()],
                right: vec![offset.len()],
            });
        }
        Ok(Self {
            todims: linear.nrows(),
            fromdims: linear.ncols(),
            linear: linear.iter().copied().map(OrderedFloat).collect(),
            offset: offset.iter().copied().map(OrderedFloat).collect(),
        })
    }

    /// A shift followed by a uniform scaling, mapping `ndims` coordinates onto themselves.
    pub fn scale_and_shift(scale: f64, shift: &[f64]) -> Self {
        let ndims = shift.len();
        let linear = DMatrix::from_diagonal_element(ndims, ndims, scale);
        let offset = DVector::from_column_slice(shift);
        Self::new(&linear, &offset).expect("Internal error: Shapes are consistent by construction")
    }

    pub fn todims(&self) -> usize {
        self.todims
    }

    pub fn fromdims(&self) -> usize {
        self.fromdims
    }

    pub fn linear(&self) -> DMatrix<f64> {
        DMatrix::from_iterator(self.todims, self.fromdims, self.linear.iter().map(|x| x.0))
    }

    pub fn offset(&self) -> DVector<f64> {
        DVector::from_iterator(self.todims, self.offset.iter().map(|x| x.0))
    }

    /// Applies the map to every row of `coords` (`npoints x fromdims`).
    pub fn apply(&self, coords: &DMatrix<f64>) -> DMatrix<f64> {
        assert_eq!(coords.ncols(), self.fromdims, "Coordinate dimension must match transform");
        let mut mapped = coords * self.linear().transpose();
        for (j, b) in self.offset.iter().enumerate() {
            mapped.column_mut(j).add_scalar_mut(b.0);
        }
        mapped
    }
}

/// A chain of affine edges, root first.
pub type TransformChain = Arc<[TransformItem]>;

/// Applies the chain to every row of `coords`, leaf edge first.
pub fn apply_chain(chain: &[TransformItem], coords: &DMatrix<f64>) -> DMatrix<f64> {
    chain
        .iter()
        .rev()
        .fold(coords.clone(), |coords, item| item.apply(&coords))
}

/// The linear part of the composed chain, `todims x fromdims`.
pub fn chain_linear(chain: &[TransformItem], ndims: usize) -> DMatrix<f64> {
    chain
        .iter()
        .fold(DMatrix::identity(ndims, ndims), |linear, item| linear * item.linear())
}

/// The volume scaling of the composed chain.
///
/// For square maps this is the absolute determinant, for maps into a higher-dimensional
/// space it is the square root of the Gram determinant.
pub fn chain_jacobian(chain: &[TransformItem], todims: usize) -> f64 {
    let linear = chain_linear(chain, todims);
    if linear.is_square() {
        linear.determinant().abs()
    } else {
        (linear.transpose() * &linear).determinant().abs().sqrt()
    }
}

#[derive(Debug)]
struct TransformsData {
    todims: usize,
    fromdims: usize,
    chains: Vec<TransformChain>,
    lookup: OnceLock<FxHashMap<TransformChain, usize>>,
}

/// A sequence of transform chains, one per element.
///
/// Cloning is cheap: the chains are shared.
#[derive(Debug, Clone)]
pub struct Transforms {
    data: Arc<TransformsData>,
}

impl PartialEq for Transforms {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
            || (self.data.todims == other.data.todims
                && self.data.fromdims == other.data.fromdims
                && self.data.chains == other.data.chains)
    }
}

impl Transforms {
    /// Creates a sequence of chains that all map `fromdims` element coordinates into a
    /// `todims` root space.
    pub fn from_chains(todims: usize, fromdims: usize, chains: Vec<TransformChain>) -> Result<Self, SampleError> {
        for chain in &chains {
            let chain_todims = chain.first().map(TransformItem::todims).unwrap_or(fromdims);
            let chain_fromdims = chain.last().map(TransformItem::fromdims).unwrap_or(todims);
            let connected = chain
                .windows(2)
                .all(|pair| pair[0].fromdims() == pair[1].todims());
            if chain_todims != todims || chain_fromdims != fromdims || !connected {
                return Err(SampleError::ShapeMismatch {
                    left: vec![todims, fromdims],
                    right: vec![chain_todims, chain_fromdims],
                });
            }
        }
        Ok(Self {
            data: Arc::new(TransformsData {
                todims,
                fromdims,
                chains,
                lookup: OnceLock::new(),
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.data.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.chains.is_empty()
    }

    pub fn todims(&self) -> usize {
        self.data.todims
    }

    pub fn fromdims(&self) -> usize {
        self.data.fromdims
    }

    pub fn get(&self, index: usize) -> Option<&TransformChain> {
        self.data.chains.get(index)
    }

    pub fn chains(&self) -> &[TransformChain] {
        &self.data.chains
    }

    /// Selects the chains with the given indices, in the given order.
    pub fn take(&self, indices: &[usize]) -> Result<Self, SampleError> {
        let chains = indices
            .iter()
            .map(|&i| {
                self.get(i).cloned().ok_or(SampleError::IndexOutOfRange {
                    index: i,
                    len: self.len(),
                })
            })
            .collect::<Result<_, _>>()?;
        Self::from_chains(self.todims(), self.fromdims(), chains)
    }

    /// Refines every element by the given child edges.
    ///
    /// Element `i` of the input becomes elements `i * children.len() .. (i + 1) * children.len()`
    /// of the output.
    pub fn refined(&self, children: &[TransformItem]) -> Result<Self, SampleError> {
        let fromdims = children.first().map(TransformItem::fromdims).unwrap_or(self.fromdims());
        let chains = self
            .chains()
            .iter()
            .flat_map(|chain| {
                children.iter().map(move |child| {
                    chain
                        .iter()
                        .cloned()
                        .chain(std::iter::once(child.clone()))
                        .collect::<TransformChain>()
                })
            })
            .collect();
        Self::from_chains(self.todims(), fromdims, chains)
    }

    fn lookup(&self) -> &FxHashMap<TransformChain, usize> {
        self.data.lookup.get_or_init(|| {
            let mut lookup = FxHashMap::default();
            for (index, chain) in self.data.chains.iter().enumerate().rev() {
                lookup.insert(chain.clone(), index);
            }
            lookup
        })
    }

    /// Finds the element whose chain is the longest prefix of `chain`.
    ///
    /// Returns the element index and the length of the matching prefix. The remaining items of
    /// `chain` form the tail that maps into the local coordinates of the found element.
    pub fn index_with_tail(&self, chain: &[TransformItem]) -> Option<(usize, usize)> {
        let lookup = self.lookup();
        (0..=chain.len())
            .rev()
            .find_map(|n| lookup.get(&chain[..n]).map(|&index| (index, n)))
    }
}
