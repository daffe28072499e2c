use crate::error::SampleError;
use crate::evaluable::{ArrayNode, IndexNode};
use crate::transforms::Transforms;
use rustc_hash::FxHashMap;

/// Per-element context needed to lower a [`Function`](crate::function::Function).
///
/// `points_shape` holds the lengths of the points axes that lead every lowered array. For every
/// space, `transform_chains` holds the transform sequences of the space together with the element
/// index into them, and `coordinates` holds the local coordinates of shape
/// `(*points_shape, ndims)`.
#[derive(Debug, Clone, Default)]
pub struct LowerArgs {
    pub points_shape: Vec<IndexNode>,
    pub transform_chains: FxHashMap<String, (Vec<Transforms>, IndexNode)>,
    pub coordinates: FxHashMap<String, ArrayNode>,
}

impl LowerArgs {
    /// Context of a single space with a single points axis.
    ///
    /// `coordinates` must have shape `(npoints, ndims)`.
    pub fn for_space(space: &str, transforms: Vec<Transforms>, ielem: IndexNode, coordinates: ArrayNode) -> Self {
        let npoints = IndexNode::length(coordinates.clone(), 0);
        let mut transform_chains = FxHashMap::default();
        transform_chains.insert(space.to_string(), (transforms, ielem));
        let mut coords = FxHashMap::default();
        coords.insert(space.to_string(), coordinates);
        Self {
            points_shape: vec![npoints],
            transform_chains,
            coordinates: coords,
        }
    }

    pub fn spaces(&self) -> impl Iterator<Item = &str> {
        self.transform_chains.keys().map(String::as_str)
    }

    /// Combines two contexts over disjoint spaces.
    ///
    /// The points axes of `other` are appended to those of `self`. All coordinates are
    /// broadcast over the combined points axes, so that they remain aligned with the new
    /// `points_shape`.
    pub fn merge(self, other: LowerArgs) -> Result<Self, SampleError> {
        for space in other.transform_chains.keys() {
            if self.transform_chains.contains_key(space) {
                return Err(SampleError::OverlappingSpaces { space: space.clone() });
            }
        }

        let nleft = self.points_shape.len();
        let mut coordinates = FxHashMap::default();
        for (space, coords) in self.coordinates {
            let coords = other
                .points_shape
                .iter()
                .enumerate()
                .fold(coords, |coords, (k, n)| coords.insert_axis(nleft + k, n.clone()));
            coordinates.insert(space, coords);
        }
        for (space, coords) in other.coordinates {
            let coords = self
                .points_shape
                .iter()
                .enumerate()
                .fold(coords, |coords, (k, n)| coords.insert_axis(k, n.clone()));
            coordinates.insert(space, coords);
        }

        let mut transform_chains = self.transform_chains;
        transform_chains.extend(other.transform_chains);
        let mut points_shape = self.points_shape;
        points_shape.extend(other.points_shape);
        Ok(Self {
            points_shape,
            transform_chains,
            coordinates,
        })
    }

    /// Combines two contexts over disjoint spaces that share the same points axes.
    ///
    /// The points shape of `self` is kept.
    pub(crate) fn union(self, other: LowerArgs) -> Result<Self, SampleError> {
        let mut merged = self;
        for (space, chains) in other.transform_chains {
            if merged.transform_chains.contains_key(&space) {
                return Err(SampleError::OverlappingSpaces { space });
            }
            merged.transform_chains.insert(space, chains);
        }
        merged.coordinates.extend(other.coordinates);
        Ok(merged)
    }

    /// Selects points along the (single) points axis.
    ///
    /// All coordinates are gathered with `indices`, and the points shape becomes `npoints`, the
    /// length of `indices`. A context without points axes has no coordinates, so only its points
    /// shape changes.
    pub(crate) fn take_points(self, indices: IndexNode, npoints: IndexNode) -> Self {
        let coordinates = self
            .coordinates
            .into_iter()
            .map(|(space, coords)| (space, coords.take(indices.clone(), 0)))
            .collect();
        Self {
            points_shape: vec![npoints],
            transform_chains: self.transform_chains,
            coordinates,
        }
    }
}
