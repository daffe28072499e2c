use nalgebra::DMatrix;
use ndarray::{ArrayD, IxDyn};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Approx assertion for dynamic-rank arrays, which must also agree in shape.
#[macro_export]
macro_rules! assert_approx_array_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y) = (&$x, &$y);
        assert_eq!(x.shape(), y.shape(), "arrays differ in shape");
        let max_absdiff = $crate::max_abs_diff(x, y);
        if !(max_absdiff <= $tol) {
            println!("abstol: {:e}", $tol);
            println!("left: {}", x);
            println!("right: {}", y);
            println!("max abs diff: {:e}", max_absdiff);
        }
        assert!(max_absdiff <= $tol);
    }};
}

pub fn max_abs_diff(x: &ArrayD<f64>, y: &ArrayD<f64>) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// Builds a dynamic-rank array from a shape and row-major values.
pub fn array(shape: &[usize], values: &[f64]) -> ArrayD<f64> {
    ArrayD::from_shape_vec(IxDyn(shape), values.to_vec()).expect("Shape must match number of values")
}

/// Views a rank-2 array as a matrix.
pub fn array_to_matrix(array: &ArrayD<f64>) -> DMatrix<f64> {
    assert_eq!(array.ndim(), 2, "Array must have rank 2");
    let (nrows, ncols) = (array.shape()[0], array.shape()[1]);
    DMatrix::from_fn(nrows, ncols, |i, j| array[IxDyn(&[i, j])])
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}
