//! Strategies for generating samples in property-based tests.
use crate::points::Points;
use crate::procedural::{line, unit_segments, LineRule};
use crate::sample::Sample;
use ::proptest::prelude::*;
use ::proptest::sample::subsequence;

impl Arbitrary for LineRule {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            (1..5usize).prop_map(LineRule::Gauss),
            (1..5usize).prop_map(LineRule::Uniform),
            (2..5usize).prop_map(LineRule::Bezier),
        ]
        .boxed()
    }
}

/// Strictly increasing vertex coordinates for `1 ..= max_elems` segments.
pub fn line_vertices(max_elems: usize) -> impl Strategy<Value = Vec<f64>> {
    // Bounded segment lengths keep the element maps well conditioned
    (-10.0..10.0, prop::collection::vec(0.1..2.0, 1..=max_elems)).prop_map(|(start, lengths)| {
        let mut vertices = vec![start];
        for length in lengths {
            let last = vertices[vertices.len() - 1];
            vertices.push(last + length);
        }
        vertices
    })
}

/// A line sample on `space` with the same weighted points in every element.
pub fn line_sample(space: &'static str, max_elems: usize) -> impl Strategy<Value = Sample> {
    let rule = prop_oneof![
        (1..4usize).prop_map(LineRule::Gauss),
        (1..4usize).prop_map(LineRule::Uniform)
    ];
    (line_vertices(max_elems), rule).prop_map(move |(vertices, rule)| {
        line(space, &vertices, rule).expect("Strategy only generates valid lines")
    })
}

/// A line sample on `space` with a varying number of points per element.
pub fn irregular_line_sample(space: &'static str, max_elems: usize) -> impl Strategy<Value = Sample> {
    prop::collection::vec(1..4usize, 1..=max_elems).prop_map(move |counts| {
        let points = counts.into_iter().map(Points::uniform_line).collect();
        unit_segments(space, points).expect("Strategy only generates valid lines")
    })
}

/// A sample paired with a point mask of matching length.
pub fn sample_with_mask(sample: impl Strategy<Value = Sample>) -> impl Strategy<Value = (Sample, Vec<bool>)> {
    sample.prop_flat_map(|sample| {
        let npoints = sample.npoints();
        (Just(sample), prop::collection::vec(any::<bool>(), npoints))
    })
}

/// A sample paired with distinct element indices, in arbitrary order.
pub fn sample_with_elements(sample: impl Strategy<Value = Sample>) -> impl Strategy<Value = (Sample, Vec<usize>)> {
    sample.prop_flat_map(|sample| {
        let nelems = sample.nelems();
        let indices = subsequence((0..nelems).collect::<Vec<_>>(), 0..=nelems).prop_shuffle();
        (Just(sample), indices)
    })
}
