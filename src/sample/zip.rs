use crate::error::SampleError;
use crate::evaluable::{ArrayNode, IndexNode};
use crate::function::LowerArgs;
use crate::sample::Sample;
use crate::util::offsets_from_counts;
use itertools::Itertools;
use log::trace;
use rustc_hash::FxHashSet;

/// Element structure of zipped samples.
///
/// The merged elements are the distinct tuples of constituent elements, in lexicographic order.
/// Points are grouped by merged element, keeping their relative order within each group.
#[derive(Debug)]
pub(crate) struct ZipData {
    samples: Vec<Sample>,
    // Offsets into `indices` per merged element
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    // Zip point indices, grouped by merged element
    indices: Vec<usize>,
    // Per constituent: the constituent element of every merged element
    ielems: Vec<Vec<usize>>,
    // Per constituent: the local point index of every entry of `indices`
    ilocals: Vec<Vec<usize>>,
}

impl ZipData {
    pub(crate) fn new(samples: &[Sample]) -> Result<Self, SampleError> {
        let first = samples.first().ok_or(SampleError::EmptySelection)?;
        let npoints = first.npoints();
        if let Some(sample) = samples.iter().find(|s| s.npoints() != npoints) {
            return Err(SampleError::PointCountMismatch {
                expected: npoints,
                actual: sample.npoints(),
            });
        }
        let mut seen = FxHashSet::default();
        for space in samples.iter().flat_map(|s| s.spaces()) {
            if !seen.insert(space) {
                return Err(SampleError::OverlappingSpaces { space: space.clone() });
            }
        }

        // Element and local index of every point, per constituent
        let mut point_ielems = vec![vec![0; npoints]; samples.len()];
        let mut point_ilocals = vec![vec![0; npoints]; samples.len()];
        for (isample, sample) in samples.iter().enumerate() {
            for ielem in 0..sample.nelems() {
                for (ilocal, i) in sample.getindex(ielem)?.into_iter().enumerate() {
                    point_ielems[isample][i] = ielem;
                    point_ilocals[isample][i] = ilocal;
                }
            }
        }

        let key = |p: usize| -> Vec<usize> { point_ielems.iter().map(|ielems| ielems[p]).collect() };
        let mut indices: Vec<usize> = (0..npoints).collect();
        indices.sort_by_cached_key(|&p| key(p));

        let mut sizes = Vec::new();
        let mut ielems = vec![Vec::new(); samples.len()];
        for (element, group) in &indices.iter().group_by(|&&p| key(p)) {
            sizes.push(group.count());
            for (isample, ielem) in element.into_iter().enumerate() {
                ielems[isample].push(ielem);
            }
        }
        let ilocals = point_ilocals
            .iter()
            .map(|ilocal| indices.iter().map(|&p| ilocal[p]).collect())
            .collect();

        trace!(
            "Zipped {} samples with {} points into {} elements",
            samples.len(),
            npoints,
            sizes.len()
        );

        Ok(Self {
            samples: samples.to_vec(),
            offsets: offsets_from_counts(sizes.iter().copied()),
            sizes,
            indices,
            ielems,
            ilocals,
        })
    }

    pub(crate) fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub(crate) fn getindex(&self, ielem: usize) -> &[usize] {
        &self.indices[self.offsets[ielem]..self.offsets[ielem + 1]]
    }

    /// Positions in `indices` of the points of the merged element `ielem`.
    fn get_slice(&self, ielem: &IndexNode) -> IndexNode {
        let offset = IndexNode::array(self.offsets.clone()).take(ielem.clone());
        let size = IndexNode::array(self.sizes.clone()).take(ielem.clone());
        IndexNode::range(size) + offset
    }

    fn constituent(&self, isample: usize, ielem: &IndexNode) -> (IndexNode, IndexNode) {
        let ielem_i = IndexNode::array(self.ielems[isample].clone()).take(ielem.clone());
        let slice_i = IndexNode::array(self.ilocals[isample].clone()).take(self.get_slice(ielem));
        (ielem_i, slice_i)
    }

    pub(crate) fn get_evaluable_indices(&self, ielem: IndexNode) -> IndexNode {
        IndexNode::array(self.indices.clone()).take(self.get_slice(&ielem))
    }

    /// Weights of the first constituent only.
    pub(crate) fn get_evaluable_weights(&self, ielem: IndexNode) -> Result<ArrayNode, SampleError> {
        let (ielem0, slice0) = self.constituent(0, &ielem);
        Ok(self.samples[0].get_evaluable_weights(ielem0)?.take(slice0, 0))
    }

    pub(crate) fn get_lower_args(&self, ielem: IndexNode) -> Result<LowerArgs, SampleError> {
        let npoints = IndexNode::array(self.sizes.clone()).take(ielem.clone());
        let mut args = LowerArgs {
            points_shape: vec![npoints.clone()],
            ..LowerArgs::default()
        };
        for (isample, sample) in self.samples.iter().enumerate() {
            let (ielem_i, slice_i) = self.constituent(isample, &ielem);
            let args_i = sample
                .get_lower_args(ielem_i)?
                .take_points(slice_i, npoints.clone());
            args = args.union(args_i)?;
        }
        Ok(args)
    }
}
