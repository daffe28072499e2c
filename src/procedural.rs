//! Basic procedural sample generation routines.
use crate::error::SampleError;
use crate::points::{Points, PointsSequence};
use crate::sample::Sample;
use crate::transforms::{TransformChain, TransformItem, Transforms};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A rule for placing points in a line element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRule {
    /// Gauss-Legendre points, exact for polynomials up to degree `2 n - 1`.
    Gauss(usize),
    /// Midpoints of `n` equal subintervals.
    Uniform(usize),
    /// `n` equidistant points including both end points, without weights.
    Bezier(usize),
}

impl LineRule {
    pub fn points(&self) -> Points {
        match *self {
            Self::Gauss(n) => Points::gauss_line(n),
            Self::Uniform(n) => Points::uniform_line(n),
            Self::Bezier(n) => Points::bezier_line(n),
        }
    }
}

/// One single-edge chain per segment `[vertices[i], vertices[i + 1]]`.
pub fn line_transforms(vertices: &[f64]) -> Result<Transforms, SampleError> {
    let chains = vertices
        .windows(2)
        .map(|segment| {
            let edge = TransformItem::scale_and_shift(segment[1] - segment[0], &[segment[0]]);
            TransformChain::from(vec![edge])
        })
        .collect();
    Transforms::from_chains(1, 1, chains)
}

/// Splits every element in two halves.
pub fn bisect(transforms: &Transforms) -> Result<Transforms, SampleError> {
    let ndims = transforms.fromdims();
    let children: Vec<TransformItem> = (0..1usize << ndims)
        .map(|child| {
            let shift: Vec<f64> = (0..ndims)
                .map(|d| if child >> (ndims - 1 - d) & 1 == 1 { 0.5 } else { 0.0 })
                .collect();
            TransformItem::scale_and_shift(0.5, &shift)
        })
        .collect();
    transforms.refined(&children)
}

/// A sample on the line through `vertices`, with the same points in every segment.
pub fn line(space: &str, vertices: &[f64], rule: LineRule) -> Result<Sample, SampleError> {
    let transforms = line_transforms(vertices)?;
    let points = PointsSequence::uniform(rule.points(), transforms.len());
    Sample::new(space, vec![transforms], points, None)
}

/// The tensor product of line samples, one per `(space, vertices)` pair.
pub fn rectilinear(axes: &[(&str, &[f64])], rule: LineRule) -> Result<Sample, SampleError> {
    let mut samples = axes
        .iter()
        .map(|&(space, vertices)| line(space, vertices, rule));
    let first = samples.next().ok_or(SampleError::EmptySelection)??;
    samples.try_fold(first, |product, sample| product.multiply(&sample?))
}

/// A sample with the given point sets, one per element, on the unit segments `[i, i + 1]`.
pub fn unit_segments(space: &str, points: Vec<Points>) -> Result<Sample, SampleError> {
    let vertices: Vec<f64> = (0..=points.len()).map(|i| i as f64).collect();
    let transforms = line_transforms(&vertices)?;
    let ndims = points.first().map(Points::ndims).unwrap_or(1);
    let points = PointsSequence::from_points(ndims, points.into_iter().map(Arc::new).collect())?;
    Sample::new(space, vec![transforms], points, None)
}
