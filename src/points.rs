//! Per-element point sets.
//!
//! A [`Points`] instance holds the local coordinates of the points in a single element together
//! with (optional) integration weights and a local triangulation of the interior and hull.
//! A [`PointsSequence`] assigns one such instance to every element of a sample.
use crate::error::SampleError;
use crate::evaluable::{ArrayNode, IndexNode};
use crate::util::{extrude_simplices, offsets_from_counts, stack_rows};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use std::sync::Arc;

/// Points in the local coordinate system of a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct Points {
    // npoints x ndims
    coords: DMatrix<f64>,
    weights: Option<DVector<f64>>,
    // ntri x (ndims + 1)
    tri: DMatrix<usize>,
    // nhull x ndims
    hull: DMatrix<usize>,
}

impl Points {
    pub fn from_parts(
        coords: DMatrix<f64>,
        weights: Option<DVector<f64>>,
        tri: DMatrix<usize>,
        hull: DMatrix<usize>,
    ) -> Result<Self, SampleError> {
        let npoints = coords.nrows();
        let ndims = coords.ncols();
        if let Some(weights) = &weights {
            if weights.len() != npoints {
                return Err(SampleError::ShapeMismatch {
                    left: vec![npoints],
                    right: vec![weights.len()],
                });
            }
        }
        if tri.ncols() != ndims + 1 || hull.ncols() != ndims {
            return Err(SampleError::ShapeMismatch {
                left: vec![tri.ncols(), hull.ncols()],
                right: vec![ndims + 1, ndims],
            });
        }
        if let Some(&index) = tri.iter().chain(hull.iter()).find(|&&i| i >= npoints) {
            return Err(SampleError::IndexOutOfRange { index, len: npoints });
        }
        Ok(Self {
            coords,
            weights,
            tri,
            hull,
        })
    }

    /// A single point without spatial extent.
    pub fn vertex() -> Self {
        Self {
            coords: DMatrix::zeros(1, 0),
            weights: Some(DVector::from_element(1, 1.0)),
            tri: DMatrix::zeros(1, 1),
            hull: DMatrix::zeros(0, 0),
        }
    }

    /// Gauss-Legendre points on the reference interval `[0, 1]`.
    ///
    /// With `n` points, polynomials of order up to `2 n - 1` are integrated exactly.
    ///
    /// # Panics
    ///
    /// Panics if zero points are requested.
    pub fn gauss_line(num_points: usize) -> Self {
        let n = num_points;
        assert!(n > 0, "number of points must be positive");

        // Roots of the Legendre polynomial on [-1, 1], found by Newton's method from the
        // standard initial guess. The second half follows by symmetry.
        let m = (n + 1) / 2;
        let mut roots = vec![0.0; n];
        let mut weights = vec![0.0; n];
        for i in 0..m {
            let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre(n, x);
                let dx = -p / dp;
                x += dx;
                if dx.abs() <= 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre(n, x);
            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            roots[i] = x;
            weights[i] = w;
            roots[n - 1 - i] = -x;
            weights[n - 1 - i] = w;
        }

        // Map [-1, 1] onto [0, 1], in increasing order
        let coords = DMatrix::from_iterator(n, 1, roots.iter().rev().map(|x| 0.5 * (x + 1.0)));
        let weights = DVector::from_iterator(n, weights.iter().rev().map(|w| 0.5 * w));
        Self::line_from_sorted(coords, Some(weights))
    }

    /// Equally weighted points at the centers of `n` equal subintervals of `[0, 1]`.
    pub fn uniform_line(num_points: usize) -> Self {
        assert!(num_points > 0, "number of points must be positive");
        let n = num_points as f64;
        let coords = DMatrix::from_fn(num_points, 1, |i, _| (i as f64 + 0.5) / n);
        let weights = DVector::from_element(num_points, 1.0 / n);
        Self::line_from_sorted(coords, Some(weights))
    }

    /// Equidistant points on `[0, 1]` including both end points, without weights.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two points are requested.
    pub fn bezier_line(num_points: usize) -> Self {
        assert!(num_points >= 2, "a Bezier point set needs at least both end points");
        let n = (num_points - 1) as f64;
        let coords = DMatrix::from_fn(num_points, 1, |i, _| i as f64 / n);
        Self::line_from_sorted(coords, None)
    }

    fn line_from_sorted(coords: DMatrix<f64>, weights: Option<DVector<f64>>) -> Self {
        let n = coords.nrows();
        let tri = DMatrix::from_fn(n.saturating_sub(1), 2, |i, j| i + j);
        let hull = DMatrix::from_row_slice(2, 1, &[0, n - 1]);
        Self {
            coords,
            weights,
            tri,
            hull,
        }
    }

    /// The tensor product of two point sets.
    ///
    /// Point `(i, j)` becomes point `i * other.npoints() + j`. The triangulation is only
    /// available if `self` is one-dimensional.
    pub fn product(&self, other: &Points) -> Result<Self, SampleError> {
        if self.ndims() != 1 {
            return Err(SampleError::TriangulationUnavailable { variant: "product" });
        }
        let (n1, n2) = (self.npoints(), other.npoints());
        let ndims = self.ndims() + other.ndims();
        let coords = DMatrix::from_fn(n1 * n2, ndims, |p, d| {
            let (i, j) = (p / n2, p % n2);
            if d < self.ndims() {
                self.coords[(i, d)]
            } else {
                other.coords[(j, d - self.ndims())]
            }
        });
        let weights = match (&self.weights, &other.weights) {
            (Some(w1), Some(w2)) => Some(DVector::from_fn(n1 * n2, |p, _| w1[p / n2] * w2[p % n2])),
            _ => None,
        };
        let tri = extrude_simplices(&self.tri, &other.tri, n2);
        let hull = stack_rows(
            [
                &extrude_simplices(&self.hull, &other.tri, n2),
                &extrude_simplices(&self.tri, &other.hull, n2),
            ],
            ndims,
        );
        Ok(Self {
            coords,
            weights,
            tri,
            hull,
        })
    }

    pub fn npoints(&self) -> usize {
        self.coords.nrows()
    }

    pub fn ndims(&self) -> usize {
        self.coords.ncols()
    }

    pub fn coords(&self) -> &DMatrix<f64> {
        &self.coords
    }

    pub fn weights(&self) -> Option<&DVector<f64>> {
        self.weights.as_ref()
    }

    pub fn tri(&self) -> &DMatrix<usize> {
        &self.tri
    }

    pub fn hull(&self) -> &DMatrix<usize> {
        &self.hull
    }
}

/// Value and derivative of the Legendre polynomial of degree `n` at `x`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for m in 1..=n {
        let m = m as f64;
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
    }
    let dp = n as f64 * (x * p1 - p2) / (x * x - 1.0);
    (p1, dp)
}

#[derive(Debug)]
struct PointsSequenceData {
    ndims: usize,
    points: Vec<Arc<Points>>,
    offsets: Vec<usize>,
}

/// One point set per element.
///
/// Cloning is cheap, and elements that share a point set share the allocation.
#[derive(Debug, Clone)]
pub struct PointsSequence {
    data: Arc<PointsSequenceData>,
}

impl PointsSequence {
    pub fn from_points(ndims: usize, points: Vec<Arc<Points>>) -> Result<Self, SampleError> {
        if let Some(p) = points.iter().find(|p| p.ndims() != ndims) {
            return Err(SampleError::ShapeMismatch {
                left: vec![ndims],
                right: vec![p.ndims()],
            });
        }
        let offsets = offsets_from_counts(points.iter().map(|p| p.npoints()));
        Ok(Self {
            data: Arc::new(PointsSequenceData { ndims, points, offsets }),
        })
    }

    /// The same point set repeated for `nelems` elements.
    pub fn uniform(points: Points, nelems: usize) -> Self {
        let ndims = points.ndims();
        let points = Arc::new(points);
        Self::from_points(ndims, vec![points; nelems]).expect("Internal error: Dimensions are equal by construction")
    }

    pub fn len(&self) -> usize {
        self.data.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.points.is_empty()
    }

    pub fn ndims(&self) -> usize {
        self.data.ndims
    }

    /// Total number of points over all elements.
    pub fn npoints(&self) -> usize {
        *self
            .data
            .offsets
            .last()
            .expect("Internal error: Offsets are never empty")
    }

    /// Offsets of the first point of every element in the concatenation of all points.
    pub fn offsets(&self) -> &[usize] {
        &self.data.offsets
    }

    pub fn get(&self, ielem: usize) -> Result<&Arc<Points>, SampleError> {
        self.data.points.get(ielem).ok_or(SampleError::IndexOutOfRange {
            index: ielem,
            len: self.len(),
        })
    }

    /// Selects the point sets of the given elements, in the given order.
    pub fn take(&self, indices: &[usize]) -> Result<Self, SampleError> {
        let points = indices
            .iter()
            .map(|&i| self.get(i).cloned())
            .collect::<Result<_, _>>()?;
        Self::from_points(self.ndims(), points)
    }

    /// Coordinates (`npoints x ndims`) of the element selected by `ielem` during evaluation.
    pub fn get_evaluable_coords(&self, ielem: IndexNode) -> ArrayNode {
        ArrayNode::ElementCoords {
            points: self.clone(),
            ielem: Box::new(ielem),
        }
    }

    /// Weights (`npoints`) of the element selected by `ielem` during evaluation.
    pub fn get_evaluable_weights(&self, ielem: IndexNode) -> ArrayNode {
        ArrayNode::ElementWeights {
            points: self.clone(),
            ielem: Box::new(ielem),
        }
    }
}
