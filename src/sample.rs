//! Samples: collections of points on the elements of a topology.
//!
//! A [`Sample`] is formed from element transforms and per-element points, or algebraically
//! from other samples: [`Sample::add`] concatenates two samples on the same spaces,
//! [`Sample::multiply`] forms the tensor product of samples on disjoint spaces,
//! [`Sample::zip`] aligns samples on disjoint spaces that share their points, and
//! [`Sample::take_elements`] and [`Sample::subset`] restrict a sample to some of its elements.
//!
//! Every sample numbers its points globally, and [`Sample::getindex`] maps an element to the
//! global indices of its points. Evaluation and integration are expressed as graph nodes
//! (see [`crate::evaluable`]) that loop over all elements in a single pass.
use crate::error::SampleError;
use crate::evaluable::{ArrayNode, IndexNode, LoopIndex};
use crate::function::LowerArgs;
use crate::points::PointsSequence;
use crate::transforms::Transforms;
use crate::util::{extrude_simplices, offsets_from_counts, ranks, stack_rows, take_entries};
use itertools::Itertools;
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

mod evaluate;
mod zip;

pub use evaluate::{eval_integrals, eval_integrals_with};

use zip::ZipData;

#[derive(Debug)]
struct LeafData {
    space: String,
    transforms: Vec<Transforms>,
    points: PointsSequence,
}

#[derive(Debug)]
enum SampleKind {
    Leaf(LeafData),
    /// Points of a leaf renumbered through a custom index.
    Reindexed { parent: Sample, index: Vec<usize> },
    Empty,
    Sum(Sample, Sample),
    Product(Sample, Sample),
    Zipped(ZipData),
    TakeElements {
        parent: Sample,
        indices: Vec<usize>,
        offsets: OnceLock<Vec<usize>>,
    },
    /// Reports every index and graph query as not implemented.
    #[cfg_attr(not(feature = "proptest-support"), allow(dead_code))]
    Unimplemented,
}

#[derive(Debug)]
struct SampleData {
    spaces: Vec<String>,
    ndims: usize,
    nelems: usize,
    npoints: usize,
    kind: SampleKind,
}

/// A collection of points on the elements of one or more spaces.
///
/// Samples are immutable and cheap to clone: derived samples share their parents.
#[derive(Debug, Clone)]
pub struct Sample {
    data: Arc<SampleData>,
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
            || (matches!(self.data.kind, SampleKind::Empty)
                && matches!(other.data.kind, SampleKind::Empty)
                && self.data.spaces == other.data.spaces
                && self.data.ndims == other.data.ndims)
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample<{}, {}D, {} elems, {} points>",
            self.variant_name(),
            self.ndims(),
            self.nelems(),
            self.npoints()
        )
    }
}

fn not_implemented(operation: &'static str, sample: &Sample) -> SampleError {
    SampleError::NotImplemented {
        operation,
        variant: sample.variant_name(),
    }
}

impl Sample {
    fn from_kind(spaces: Vec<String>, ndims: usize, nelems: usize, npoints: usize, kind: SampleKind) -> Self {
        Self {
            data: Arc::new(SampleData {
                spaces,
                ndims,
                nelems,
                npoints,
                kind,
            }),
        }
    }

    /// Creates a sample on `space` with the given element transforms and points.
    ///
    /// All transform sequences must have one chain per element of `points`. Without `index`, the
    /// points are numbered contiguously element by element. Otherwise `index` holds, for every
    /// point in that contiguous order, its number in the sample.
    pub fn new(
        space: impl Into<String>,
        transforms: Vec<Transforms>,
        points: PointsSequence,
        index: Option<Vec<usize>>,
    ) -> Result<Self, SampleError> {
        let space = space.into();
        let first = transforms.first().ok_or(SampleError::EmptySelection)?;
        if let Some(t) = transforms.iter().find(|t| t.len() != points.len()) {
            return Err(SampleError::TransformLengthMismatch {
                expected: points.len(),
                actual: t.len(),
            });
        }
        let ndims = first.fromdims();
        if points.ndims() != ndims {
            return Err(SampleError::ShapeMismatch {
                left: vec![ndims],
                right: vec![points.ndims()],
            });
        }
        let (nelems, npoints) = (points.len(), points.npoints());
        let leaf = Self::from_kind(
            vec![space.clone()],
            ndims,
            nelems,
            npoints,
            SampleKind::Leaf(LeafData {
                space,
                transforms,
                points,
            }),
        );
        match index {
            None => Ok(leaf),
            Some(index) => leaf.reindexed(index),
        }
    }

    fn reindexed(self, index: Vec<usize>) -> Result<Self, SampleError> {
        if index.len() != self.npoints() {
            return Err(SampleError::IndexLengthMismatch {
                expected: self.npoints(),
                actual: index.len(),
            });
        }
        if let Some(&i) = index.iter().find(|&&i| i >= self.npoints()) {
            return Err(SampleError::IndexOutOfRange {
                index: i,
                len: self.npoints(),
            });
        }
        Ok(Self::from_kind(
            self.data.spaces.clone(),
            self.ndims(),
            self.nelems(),
            self.npoints(),
            SampleKind::Reindexed { parent: self, index },
        ))
    }

    /// The sample without elements on the given spaces.
    pub fn empty(spaces: Vec<String>, ndims: usize) -> Self {
        Self::from_kind(spaces, ndims, 0, 0, SampleKind::Empty)
    }

    /// A sample that only knows its sizes, and reports every index and graph query as not
    /// implemented.
    ///
    /// Useful for checking which operations are expressed purely in terms of those queries.
    #[cfg(feature = "proptest-support")]
    pub fn unimplemented(spaces: Vec<String>, ndims: usize, nelems: usize, npoints: usize) -> Self {
        Self::from_kind(spaces, ndims, nelems, npoints, SampleKind::Unimplemented)
    }

    pub fn spaces(&self) -> &[String] {
        &self.data.spaces
    }

    pub fn ndims(&self) -> usize {
        self.data.ndims
    }

    pub fn nelems(&self) -> usize {
        self.data.nelems
    }

    pub fn npoints(&self) -> usize {
        self.data.npoints
    }

    pub fn is_empty(&self) -> bool {
        self.npoints() == 0
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match &self.data.kind {
            SampleKind::Leaf(_) => "leaf",
            SampleKind::Reindexed { .. } => "reindexed",
            SampleKind::Empty => "empty",
            SampleKind::Sum(..) => "sum",
            SampleKind::Product(..) => "product",
            SampleKind::Zipped(_) => "zipped",
            SampleKind::TakeElements { .. } => "element subset",
            SampleKind::Unimplemented => "unimplemented",
        }
    }

    /// The transforms and points of a sample that is backed by them directly.
    fn leaf(&self) -> Option<&LeafData> {
        match &self.data.kind {
            SampleKind::Leaf(leaf) => Some(leaf),
            SampleKind::Reindexed { parent, .. } => parent.leaf(),
            _ => None,
        }
    }

    /// The transform sequences of a transform-backed sample.
    pub fn transforms(&self) -> Option<&[Transforms]> {
        self.leaf().map(|leaf| leaf.transforms.as_slice())
    }

    /// The points of a transform-backed sample.
    pub fn points(&self) -> Option<&PointsSequence> {
        self.leaf().map(|leaf| &leaf.points)
    }

    /// The loop index that runs over all elements during evaluation.
    pub(crate) fn loop_index(&self) -> LoopIndex {
        LoopIndex::new(format!("_sample_{}", self.data.spaces.join("_")), self.nelems())
    }

    fn check_element(&self, ielem: usize) -> Result<(), SampleError> {
        if ielem < self.nelems() {
            Ok(())
        } else {
            Err(SampleError::IndexOutOfRange {
                index: ielem,
                len: self.nelems(),
            })
        }
    }

    /// The number of points of element `ielem`.
    pub fn element_npoints(&self, ielem: usize) -> Result<usize, SampleError> {
        self.check_element(ielem)?;
        match &self.data.kind {
            SampleKind::Leaf(leaf) => Ok(leaf.points.get(ielem)?.npoints()),
            SampleKind::Reindexed { parent, .. } => parent.element_npoints(ielem),
            SampleKind::Empty => unreachable!("Empty samples have no elements"),
            SampleKind::Sum(s1, s2) => match ielem.checked_sub(s1.nelems()) {
                None => s1.element_npoints(ielem),
                Some(i2) => s2.element_npoints(i2),
            },
            SampleKind::Product(s1, s2) => {
                let (i1, i2) = (ielem / s2.nelems(), ielem % s2.nelems());
                Ok(s1.element_npoints(i1)? * s2.element_npoints(i2)?)
            }
            SampleKind::Zipped(zip) => Ok(zip.sizes()[ielem]),
            SampleKind::TakeElements { .. } => {
                let offsets = self.take_offsets()?;
                Ok(offsets[ielem + 1] - offsets[ielem])
            }
            SampleKind::Unimplemented => Err(not_implemented("element_npoints", self)),
        }
    }

    /// The global indices of the points of element `ielem`.
    pub fn getindex(&self, ielem: usize) -> Result<Vec<usize>, SampleError> {
        self.check_element(ielem)?;
        match &self.data.kind {
            SampleKind::Leaf(leaf) => {
                let offsets = leaf.points.offsets();
                Ok((offsets[ielem]..offsets[ielem + 1]).collect())
            }
            SampleKind::Reindexed { parent, index } => {
                Ok(parent.getindex(ielem)?.into_iter().map(|i| index[i]).collect())
            }
            SampleKind::Empty => unreachable!("Empty samples have no elements"),
            SampleKind::Sum(s1, s2) => match ielem.checked_sub(s1.nelems()) {
                None => s1.getindex(ielem),
                Some(i2) => Ok(s2
                    .getindex(i2)?
                    .into_iter()
                    .map(|i| i + s1.npoints())
                    .collect()),
            },
            SampleKind::Product(s1, s2) => {
                let (i1, i2) = (ielem / s2.nelems(), ielem % s2.nelems());
                let index2 = s2.getindex(i2)?;
                let n2 = s2.npoints();
                Ok(s1
                    .getindex(i1)?
                    .into_iter()
                    .flat_map(|a| index2.iter().map(move |&b| a * n2 + b))
                    .collect())
            }
            SampleKind::Zipped(zip) => Ok(zip.getindex(ielem).to_vec()),
            SampleKind::TakeElements { .. } => {
                let offsets = self.take_offsets()?;
                Ok((offsets[ielem]..offsets[ielem + 1]).collect())
            }
            SampleKind::Unimplemented => Err(not_implemented("getindex", self)),
        }
    }

    /// The global point indices of all elements.
    pub fn index(&self) -> Result<Vec<Vec<usize>>, SampleError> {
        (0..self.nelems()).map(|ielem| self.getindex(ielem)).collect()
    }

    /// Point offsets of an element subset, computed once.
    fn take_offsets(&self) -> Result<&[usize], SampleError> {
        match &self.data.kind {
            SampleKind::TakeElements {
                parent,
                indices,
                offsets,
            } => {
                if let Some(offsets) = offsets.get() {
                    return Ok(offsets);
                }
                let counts = indices
                    .iter()
                    .map(|&i| parent.element_npoints(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(offsets.get_or_init(|| offsets_from_counts(counts)))
            }
            _ => unreachable!("Only element subsets carry offsets"),
        }
    }

    /// The global point indices of the element selected by `ielem` during evaluation, as a
    /// one-dimensional index node.
    pub fn get_evaluable_indices(&self, ielem: IndexNode) -> Result<IndexNode, SampleError> {
        match &self.data.kind {
            SampleKind::Leaf(leaf) => {
                let npoints = IndexNode::length(leaf.points.get_evaluable_coords(ielem.clone()), 0);
                let offset = IndexNode::array(leaf.points.offsets().to_vec()).take(ielem);
                Ok(IndexNode::range(npoints) + offset)
            }
            SampleKind::Reindexed { parent, index } => {
                Ok(IndexNode::array(index.clone()).take(parent.get_evaluable_indices(ielem)?))
            }
            SampleKind::Empty => Ok(IndexNode::array(vec![])),
            SampleKind::Sum(..) => Err(not_implemented("get_evaluable_indices", self)),
            SampleKind::Product(s1, s2) => {
                let (i1, i2) = ielem.divmod(s2.nelems());
                let index1 = s1.get_evaluable_indices(i1)?;
                let index2 = s2.get_evaluable_indices(i2)?;
                let (outer, inner) = product_point_indices(&index1, &index2);
                Ok(index1.take(outer) * IndexNode::scalar(s2.npoints()) + index2.take(inner))
            }
            SampleKind::Zipped(zip) => Ok(zip.get_evaluable_indices(ielem)),
            SampleKind::TakeElements { .. } => {
                let offsets = self.take_offsets()?;
                let counts = offsets.windows(2).map(|w| w[1] - w[0]).collect();
                let npoints = IndexNode::array(counts).take(ielem.clone());
                Ok(IndexNode::range(npoints) + IndexNode::array(offsets.to_vec()).take(ielem))
            }
            SampleKind::Unimplemented => Err(not_implemented("get_evaluable_indices", self)),
        }
    }

    /// The integration weights of the element selected by `ielem` during evaluation.
    pub fn get_evaluable_weights(&self, ielem: IndexNode) -> Result<ArrayNode, SampleError> {
        match &self.data.kind {
            SampleKind::Leaf(leaf) => Ok(leaf.points.get_evaluable_weights(ielem)),
            SampleKind::Reindexed { parent, .. } => parent.get_evaluable_weights(ielem),
            SampleKind::Empty => Ok(ArrayNode::Zeros(vec![IndexNode::scalar(0)])),
            SampleKind::Sum(..) => Err(not_implemented("get_evaluable_weights", self)),
            SampleKind::Product(s1, s2) => {
                let (i1, i2) = ielem.divmod(s2.nelems());
                let (outer, inner) =
                    product_point_indices(&s1.get_evaluable_indices(i1.clone())?, &s2.get_evaluable_indices(i2.clone())?);
                let weights1 = s1.get_evaluable_weights(i1)?.take(outer, 0);
                let weights2 = s2.get_evaluable_weights(i2)?.take(inner, 0);
                Ok(weights1.multiply(weights2))
            }
            SampleKind::Zipped(zip) => zip.get_evaluable_weights(ielem),
            SampleKind::TakeElements { parent, indices, .. } => {
                parent.get_evaluable_weights(IndexNode::array(indices.clone()).take(ielem))
            }
            SampleKind::Unimplemented => Err(not_implemented("get_evaluable_weights", self)),
        }
    }

    /// The context for lowering functions on the element selected by `ielem` during evaluation.
    ///
    /// The context has a single points axis, holding the points of the element in the order of
    /// [`Sample::get_evaluable_indices`].
    pub fn get_lower_args(&self, ielem: IndexNode) -> Result<LowerArgs, SampleError> {
        match &self.data.kind {
            SampleKind::Leaf(leaf) => Ok(LowerArgs::for_space(
                &leaf.space,
                leaf.transforms.clone(),
                ielem.clone(),
                leaf.points.get_evaluable_coords(ielem),
            )),
            SampleKind::Reindexed { parent, .. } => parent.get_lower_args(ielem),
            SampleKind::Empty => Ok(LowerArgs::default()),
            SampleKind::Sum(..) => Err(not_implemented("get_lower_args", self)),
            SampleKind::Product(s1, s2) => {
                let (i1, i2) = ielem.divmod(s2.nelems());
                let index1 = s1.get_evaluable_indices(i1.clone())?;
                let index2 = s2.get_evaluable_indices(i2.clone())?;
                let npoints = index1.clone().size() * index2.clone().size();
                let (outer, inner) = product_point_indices(&index1, &index2);
                let args1 = s1.get_lower_args(i1)?.take_points(outer, npoints.clone());
                let args2 = s2.get_lower_args(i2)?.take_points(inner, npoints);
                args1.union(args2)
            }
            SampleKind::Zipped(zip) => zip.get_lower_args(ielem),
            SampleKind::TakeElements { parent, indices, .. } => {
                parent.get_lower_args(IndexNode::array(indices.clone()).take(ielem))
            }
            SampleKind::Unimplemented => Err(not_implemented("get_lower_args", self)),
        }
    }

    /// The local triangulation of element `ielem`, in terms of its points as ordered by
    /// [`Sample::getindex`].
    pub fn get_element_tri(&self, ielem: usize) -> Result<DMatrix<usize>, SampleError> {
        self.get_element_simplices(ielem, Simplices::Tri)
    }

    /// The local triangulation of the hull of element `ielem`.
    pub fn get_element_hull(&self, ielem: usize) -> Result<DMatrix<usize>, SampleError> {
        self.get_element_simplices(ielem, Simplices::Hull)
    }

    fn get_element_simplices(&self, ielem: usize, which: Simplices) -> Result<DMatrix<usize>, SampleError> {
        self.check_element(ielem)?;
        match &self.data.kind {
            SampleKind::Leaf(LeafData { points, .. }) => {
                let points = points.get(ielem)?;
                Ok(match which {
                    Simplices::Tri => points.tri().clone(),
                    Simplices::Hull => points.hull().clone(),
                })
            }
            SampleKind::Reindexed { parent, .. } => parent.get_element_simplices(ielem, which),
            SampleKind::Empty => unreachable!("Empty samples have no elements"),
            SampleKind::Sum(s1, s2) => match ielem.checked_sub(s1.nelems()) {
                None => s1.get_element_simplices(ielem, which),
                Some(i2) => s2.get_element_simplices(i2, which),
            },
            SampleKind::Product(s1, s2) => {
                if s1.ndims() == 1 {
                    let (i1, i2) = (ielem / s2.nelems(), ielem % s2.nelems());
                    let npoints2 = s2.element_npoints(i2)?;
                    let tri1 = s1.get_element_tri(i1)?;
                    let tri2 = s2.get_element_tri(i2)?;
                    Ok(match which {
                        Simplices::Tri => extrude_simplices(&tri1, &tri2, npoints2),
                        Simplices::Hull => {
                            let hull1 = s1.get_element_hull(i1)?;
                            let hull2 = s2.get_element_hull(i2)?;
                            stack_rows(
                                [
                                    &extrude_simplices(&hull1, &tri2, npoints2),
                                    &extrude_simplices(&tri1, &hull2, npoints2),
                                ],
                                self.ndims(),
                            )
                        }
                    })
                } else if s1.npoints() == 1 {
                    s2.get_element_simplices(ielem, which)
                } else if s2.npoints() == 1 {
                    s1.get_element_simplices(ielem, which)
                } else {
                    Err(SampleError::TriangulationUnavailable { variant: "product" })
                }
            }
            SampleKind::Zipped(_) => Err(not_implemented(which.element_operation(), self)),
            SampleKind::TakeElements { parent, indices, .. } => parent.get_element_simplices(indices[ielem], which),
            SampleKind::Unimplemented => Err(not_implemented(which.element_operation(), self)),
        }
    }

    /// Triangulation of the interior, in global point indices.
    ///
    /// Every row holds the `ndims + 1` vertices of a simplex.
    pub fn tri(&self) -> Result<DMatrix<usize>, SampleError> {
        self.simplices(Simplices::Tri)
    }

    /// Triangulation of the hull of every element, in global point indices.
    ///
    /// Every row holds the `ndims` vertices of a simplex. The hull includes the boundaries
    /// between elements, as the triangulations of separate elements are not connected.
    pub fn hull(&self) -> Result<DMatrix<usize>, SampleError> {
        self.simplices(Simplices::Hull)
    }

    fn simplices(&self, which: Simplices) -> Result<DMatrix<usize>, SampleError> {
        let ncols = match which {
            Simplices::Tri => self.ndims() + 1,
            Simplices::Hull => self.ndims(),
        };
        if let SampleKind::Product(s1, s2) = &self.data.kind {
            if s1.ndims() == 1 {
                let n2 = s2.npoints();
                let (tri1, tri2) = (s1.tri()?, s2.tri()?);
                return Ok(match which {
                    Simplices::Tri => extrude_simplices(&tri1, &tri2, n2),
                    Simplices::Hull => stack_rows(
                        [
                            &extrude_simplices(&s1.hull()?, &tri2, n2),
                            &extrude_simplices(&tri1, &s2.hull()?, n2),
                        ],
                        ncols,
                    ),
                });
            }
        }
        let tables = (0..self.nelems())
            .map(|ielem| {
                let index = self.getindex(ielem)?;
                Ok(take_entries(&index, &self.get_element_simplices(ielem, which)?))
            })
            .collect::<Result<Vec<_>, SampleError>>()?;
        Ok(stack_rows(&tables, ncols))
    }

    /// Concatenates two samples on the same spaces and with the same dimension.
    ///
    /// The elements and points of `other` follow those of `self`. If either sample has no
    /// points, the other one is returned.
    pub fn add(&self, other: &Sample) -> Result<Sample, SampleError> {
        if self.spaces() != other.spaces() {
            return Err(SampleError::SpaceMismatch {
                left: self.spaces().to_vec(),
                right: other.spaces().to_vec(),
            });
        }
        if self.ndims() != other.ndims() {
            return Err(SampleError::ShapeMismatch {
                left: vec![self.ndims()],
                right: vec![other.ndims()],
            });
        }
        if other.is_empty() {
            Ok(self.clone())
        } else if self.is_empty() {
            Ok(other.clone())
        } else {
            Ok(Self::from_kind(
                self.spaces().to_vec(),
                self.ndims(),
                self.nelems() + other.nelems(),
                self.npoints() + other.npoints(),
                SampleKind::Sum(self.clone(), other.clone()),
            ))
        }
    }

    /// The tensor product of two samples on disjoint spaces.
    ///
    /// Element `(i, j)` becomes element `i * other.nelems() + j`, and point `(p, q)` becomes
    /// point `p * other.npoints() + q`.
    pub fn multiply(&self, other: &Sample) -> Result<Sample, SampleError> {
        if let Some(space) = self.spaces().iter().find(|s| other.spaces().contains(s)) {
            return Err(SampleError::OverlappingSpaces { space: space.clone() });
        }
        let spaces = self.spaces().iter().chain(other.spaces()).cloned().collect();
        Ok(Self::from_kind(
            spaces,
            self.ndims() + other.ndims(),
            self.nelems() * other.nelems(),
            self.npoints() * other.npoints(),
            SampleKind::Product(self.clone(), other.clone()),
        ))
    }

    /// Joins samples on disjoint spaces that have the same number of points.
    ///
    /// Point `p` of the result is point `p` of every sample. The elements of the result are
    /// the groups of points that share their element in every sample. Integration weights are
    /// taken from the first sample only, so integrals over the result are only correctly scaled
    /// with respect to the first sample's geometry.
    pub fn zip(samples: &[Sample]) -> Result<Sample, SampleError> {
        let zip = ZipData::new(samples)?;
        let first = &samples[0];
        let spaces = samples
            .iter()
            .flat_map(|s| s.spaces().iter().cloned())
            .collect();
        Ok(Self::from_kind(
            spaces,
            first.ndims(),
            zip.sizes().len(),
            first.npoints(),
            SampleKind::Zipped(zip),
        ))
    }

    /// Restricts the sample to the given elements, in the given order.
    ///
    /// An empty selection gives the empty sample on the same spaces.
    pub fn take_elements(&self, indices: &[usize]) -> Result<Sample, SampleError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.nelems()) {
            return Err(SampleError::IndexOutOfRange {
                index,
                len: self.nelems(),
            });
        }
        if indices.is_empty() {
            return Ok(match self.data.kind {
                SampleKind::Empty => self.clone(),
                _ => Self::empty(self.spaces().to_vec(), self.ndims()),
            });
        }
        match &self.data.kind {
            SampleKind::Sum(s1, s2) => {
                // Concatenation of maximal runs of elements from the same operand
                let n1 = s1.nelems();
                let mut result = Self::empty(self.spaces().to_vec(), self.ndims());
                for (in_first, run) in &indices.iter().group_by(|&&i| i < n1) {
                    let part = if in_first {
                        s1.take_elements(&run.copied().collect::<Vec<_>>())?
                    } else {
                        s2.take_elements(&run.map(|i| i - n1).collect::<Vec<_>>())?
                    };
                    result = result.add(&part)?;
                }
                Ok(result)
            }
            SampleKind::TakeElements {
                parent,
                indices: parent_indices,
                ..
            } => {
                let composed: Vec<usize> = indices.iter().map(|&i| parent_indices[i]).collect();
                parent.take_elements(&composed)
            }
            _ => self.take_elements_generic(indices),
        }
    }

    fn take_elements_generic(&self, indices: &[usize]) -> Result<Sample, SampleError> {
        let npoints = indices
            .iter()
            .map(|&i| self.element_npoints(i))
            .sum::<Result<usize, _>>()?;
        Ok(Self::from_kind(
            self.spaces().to_vec(),
            self.ndims(),
            indices.len(),
            npoints,
            SampleKind::TakeElements {
                parent: self.clone(),
                indices: indices.to_vec(),
                offsets: OnceLock::new(),
            },
        ))
    }

    /// The elements that have at least one selected point.
    fn selected_elements(&self, mask: &[bool]) -> Result<Vec<usize>, SampleError> {
        let mut selection = Vec::new();
        for ielem in 0..self.nelems() {
            if self.getindex(ielem)?.into_iter().any(|i| mask[i]) {
                selection.push(ielem);
            }
        }
        Ok(selection)
    }

    /// Reduces the sample to the elements that contain at least one selected point.
    ///
    /// The result contains every point for which `mask` is `true`, and possibly more. The
    /// relative order of the points is preserved.
    pub fn subset(&self, mask: &[bool]) -> Result<Sample, SampleError> {
        if mask.len() != self.npoints() {
            return Err(SampleError::MaskLengthMismatch {
                expected: self.npoints(),
                actual: mask.len(),
            });
        }
        match &self.data.kind {
            SampleKind::Leaf(leaf) => {
                let selection = self.selected_elements(mask)?;
                if selection.is_empty() {
                    return Ok(Self::empty(self.spaces().to_vec(), self.ndims()));
                }
                let transforms = leaf
                    .transforms
                    .iter()
                    .map(|t| t.take(&selection))
                    .collect::<Result<_, _>>()?;
                Self::new(leaf.space.clone(), transforms, leaf.points.take(&selection)?, None)
            }
            SampleKind::Reindexed { parent, .. } => {
                let selection = self.selected_elements(mask)?;
                let mut index = Vec::new();
                for &ielem in &selection {
                    index.extend(self.getindex(ielem)?);
                }
                let parent_mask = parent_point_mask(parent, &selection)?;
                match parent.subset(&parent_mask)? {
                    reduced if reduced.is_empty() => Ok(reduced),
                    reduced => reduced.reindexed(ranks(&index)),
                }
            }
            SampleKind::Empty => Ok(self.clone()),
            SampleKind::Sum(s1, s2) => {
                let (mask1, mask2) = mask.split_at(s1.npoints());
                s1.subset(mask1)?.add(&s2.subset(mask2)?)
            }
            _ => {
                let selection = self.selected_elements(mask)?;
                self.take_elements(&selection)
            }
        }
    }
}

/// A mask that selects all points of the given elements.
fn parent_point_mask(sample: &Sample, elements: &[usize]) -> Result<Vec<bool>, SampleError> {
    let mut mask = vec![false; sample.npoints()];
    for &ielem in elements {
        for i in sample.getindex(ielem)? {
            mask[i] = true;
        }
    }
    Ok(mask)
}

/// For element point indices `index1` and `index2` of a product, the positions in either
/// factor of the flattened points `p = i * len(index2) + j`.
fn product_point_indices(index1: &IndexNode, index2: &IndexNode) -> (IndexNode, IndexNode) {
    let n2 = index2.clone().size();
    let points = IndexNode::range(index1.clone().size() * n2.clone());
    (points.clone() / n2.clone(), points % n2)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Simplices {
    Tri,
    Hull,
}

impl Simplices {
    fn element_operation(self) -> &'static str {
        match self {
            Self::Tri => "get_element_tri",
            Self::Hull => "get_element_hull",
        }
    }
}
