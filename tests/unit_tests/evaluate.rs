use fenris_sample::evaluable::Interpreter;
use fenris_sample::points::{Points, PointsSequence};
use fenris_sample::procedural::{bisect, line, line_transforms, rectilinear, unit_segments, LineRule};
use fenris_sample::proptest::{line_sample, line_vertices};
use fenris_sample::{eval_integrals, Arguments, Function, Interpolation, Sample, SampleError};
use ndarray::ArrayD;
use proptest::prelude::*;
use util::{array, assert_approx_array_eq};

fn scalar(value: &ArrayD<f64>) -> f64 {
    assert_eq!(value.ndim(), 0);
    value.iter().copied().next().unwrap()
}

#[test]
fn integrate_jacobian_gives_length() {
    let sample = line("X", &[0.0, 1.0, 3.0], LineRule::Gauss(2)).unwrap();
    let results = sample
        .integrate(&[Function::jacobian("X")], &Arguments::new())
        .unwrap();
    let length = scalar(results[0].as_dense().unwrap());
    assert!((length - 3.0).abs() <= 1e-12);
}

#[test]
fn integrate_geometry_is_exact_for_polynomials() {
    let sample = line("X", &[0.0, 1.0, 3.0], LineRule::Gauss(2)).unwrap();
    let x = Function::geometry("X", 1);
    let jac = Function::jacobian("X");
    let xx = x.multiply(&x).unwrap().multiply(&x).unwrap();
    let funcs = [x.multiply(&jac).unwrap(), xx.multiply(&jac).unwrap()];
    let results = sample.integrate(&funcs, &Arguments::new()).unwrap();
    // int_0^3 x dx = 4.5 and int_0^3 x^3 dx = 81 / 4
    assert_approx_array_eq!(results[0].to_dense(), array(&[1], &[4.5]), abstol = 1e-12);
    assert_approx_array_eq!(results[1].to_dense(), array(&[1], &[81.0 / 4.0]), abstol = 1e-12);
}

#[test]
fn integrate_over_product_and_sum() {
    let square = rectilinear(&[("X", &[0.0, 2.0][..]), ("Y", &[0.0, 1.0, 3.0][..])], LineRule::Gauss(1)).unwrap();
    let area = Function::jacobian("X")
        .multiply(&Function::jacobian("Y"))
        .unwrap();
    let results = square.integrate(&[area.clone()], &Arguments::new()).unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 6.0).abs() <= 1e-12);

    let a = line("X", &[0.0, 1.0], LineRule::Gauss(1)).unwrap();
    let b = line("X", &[2.0, 4.0], LineRule::Uniform(3)).unwrap();
    let sum = a.add(&b).unwrap();
    let results = sum
        .integrate(&[Function::jacobian("X")], &Arguments::new())
        .unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 3.0).abs() <= 1e-12);
}

#[test]
fn integrate_over_element_subsets() {
    let a = line("X", &[0.0, 1.0, 2.0], LineRule::Gauss(1)).unwrap();
    let b = line("X", &[4.0, 5.0, 7.0], LineRule::Gauss(2)).unwrap();
    let sum = a.add(&b).unwrap();
    let jac = Function::jacobian("X");
    for (indices, length) in [(&[2, 0][..], 2.0), (&[3, 0, 2][..], 4.0), (&[1, 3][..], 3.0)] {
        let taken = sum.take_elements(indices).unwrap();
        let results = taken.integrate(&[jac.clone()], &Arguments::new()).unwrap();
        assert!((scalar(results[0].as_dense().unwrap()) - length).abs() <= 1e-12);
    }

    // Elements 3 = (1, 1) and 0 = (0, 0) with areas 3 * 2 and 2 * 1
    let square = rectilinear(&[("X", &[0.0, 2.0, 5.0][..]), ("Y", &[0.0, 1.0, 3.0][..])], LineRule::Gauss(2)).unwrap();
    let area = Function::jacobian("X")
        .multiply(&Function::jacobian("Y"))
        .unwrap();
    let taken = square.take_elements(&[3, 0]).unwrap();
    let results = taken.integrate(&[area], &Arguments::new()).unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 8.0).abs() <= 1e-12);
}

#[test]
fn integrate_over_zipped_sample_uses_first_weights() {
    // X: one unit element with three points; Y: three unit elements with one point each
    let x = unit_segments("X", vec![Points::uniform_line(3)]).unwrap();
    let y = line("Y", &[0.0, 1.0, 2.0, 3.0], LineRule::Uniform(1)).unwrap();
    let funcs = [Function::jacobian("X"), Function::jacobian("Y")];

    let zipped = Sample::zip(&[x.clone(), y.clone()]).unwrap();
    let results = zipped.integrate(&funcs, &Arguments::new()).unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 1.0).abs() <= 1e-12);
    assert!((scalar(results[1].as_dense().unwrap()) - 1.0).abs() <= 1e-12);

    // With Y first, every point carries the weight of a whole Y element
    let zipped = Sample::zip(&[y, x]).unwrap();
    let results = zipped.integrate(&funcs, &Arguments::new()).unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 3.0).abs() <= 1e-12);
    assert!((scalar(results[1].as_dense().unwrap()) - 3.0).abs() <= 1e-12);
}

#[test]
fn integrate_over_empty_sample_is_zero() {
    let empty = Sample::empty(vec!["X".to_string()], 1);
    let results = empty
        .integrate(&[Function::zeros(&[2]).add(&Function::scalar(1.0)).unwrap()], &Arguments::new())
        .unwrap();
    assert_eq!(results[0].to_dense(), array(&[2], &[0.0, 0.0]));
}

#[test]
fn integrate_basis_outer_product_gives_diagonal_csr() {
    let sample = line("X", &[0.0, 1.0, 3.0], LineRule::Gauss(2)).unwrap();
    let basis = sample.basis(Interpolation::None).unwrap();
    let mass = basis.outer(&basis).multiply(&Function::jacobian("X")).unwrap();
    let results = sample.integrate(&[mass], &Arguments::new()).unwrap();
    let matrix = results[0].as_matrix().unwrap();
    assert_eq!((matrix.nrows(), matrix.ncols()), (4, 4));
    // Gauss weights are 1/2 on the reference element, scaled by the element lengths 1 and 2
    let mut expected = ArrayD::zeros(ndarray::IxDyn(&[4, 4]));
    for (i, w) in [0.5, 0.5, 1.0, 1.0].into_iter().enumerate() {
        expected[ndarray::IxDyn(&[i, i])] = w;
    }
    assert_approx_array_eq!(results[0].to_dense(), expected, abstol = 1e-12);
}

#[test]
fn integrate_without_weights_fails() {
    let sample = line("X", &[0.0, 1.0], LineRule::Bezier(2)).unwrap();
    assert!(sample
        .integrate(&[Function::jacobian("X")], &Arguments::new())
        .is_err());
}

#[test]
fn integrate_outer_product_of_arguments() {
    let sample = line("X", &[0.0, 2.0], LineRule::Gauss(1)).unwrap();
    let u = Function::argument("u", &[2]);
    let mass = u.outer(&u).multiply(&Function::jacobian("X")).unwrap();
    let arguments = Arguments::new().with("u", array(&[2], &[1.0, 3.0]));
    let results = sample.integrate(&[mass], &arguments).unwrap();
    let matrix = results[0].as_matrix().unwrap();
    assert_eq!((matrix.nrows(), matrix.ncols()), (2, 2));
    assert_approx_array_eq!(results[0].to_dense(), array(&[2, 2], &[2.0, 6.0, 6.0, 18.0]), abstol = 1e-12);

    let cube = u.outer(&u).outer(&u);
    let results = sample.integrate(&[cube], &arguments).unwrap();
    let tensor = results[0].as_sparse().unwrap();
    assert_eq!(tensor.shape(), [2, 2, 2]);
    assert_eq!(tensor.nnz(), 8);
    assert_approx_array_eq!(
        tensor.to_dense(),
        array(&[2, 2, 2], &[1.0, 3.0, 3.0, 9.0, 3.0, 9.0, 9.0, 27.0]),
        abstol = 1e-12
    );
}

#[test]
fn nested_arguments_are_flattened() {
    let sample = line("X", &[0.0, 1.0], LineRule::Gauss(1)).unwrap();
    let u = Function::argument("u", &[]);
    let nested = Arguments::nested(Arguments::new().with("u", array(&[], &[2.5])));
    let results = sample.integrate(&[u.clone()], &nested).unwrap();
    assert!((scalar(results[0].as_dense().unwrap()) - 2.5).abs() <= 1e-14);

    let missing = sample.integrate(&[u], &Arguments::new());
    assert!(missing.is_err());
}

#[test]
fn deferred_integrals_are_evaluated_together() {
    let a = line("X", &[0.0, 1.0], LineRule::Gauss(1)).unwrap();
    let b = line("Y", &[0.0, 4.0], LineRule::Gauss(1)).unwrap();
    let integrals = [a.integral(&Function::jacobian("X")), b.integral(&Function::jacobian("Y"))];
    let results = eval_integrals(&integrals, &Arguments::new()).unwrap();
    assert!((scalar(&results[0].to_dense()) - 1.0).abs() <= 1e-14);
    assert!((scalar(&results[1].to_dense()) - 4.0).abs() <= 1e-14);

    // An integral can be the integrand of another one
    let area = a.integral(&b.integral(&Function::jacobian("X").multiply(&Function::jacobian("Y")).unwrap()));
    let results = eval_integrals(&[area], &Arguments::new()).unwrap();
    assert!((scalar(&results[0].to_dense()) - 4.0).abs() <= 1e-14);
}

#[test]
fn eval_geometry_in_point_order() {
    let sample = line("X", &[0.0, 1.0, 3.0], LineRule::Bezier(2)).unwrap();
    let results = sample
        .eval(&[Function::geometry("X", 1)], &Arguments::new())
        .unwrap();
    assert_approx_array_eq!(results[0], array(&[4, 1], &[0.0, 1.0, 1.0, 3.0]), abstol = 1e-14);
}

#[test]
fn eval_follows_custom_index() {
    let transforms = line_transforms(&[0.0, 1.0, 3.0]).unwrap();
    let points = PointsSequence::uniform(Points::bezier_line(2), 2);
    let sample = Sample::new("X", vec![transforms], points, Some(vec![3, 2, 1, 0])).unwrap();
    let results = sample
        .eval(&[Function::geometry("X", 1)], &Arguments::new())
        .unwrap();
    assert_approx_array_eq!(results[0], array(&[4, 1], &[3.0, 1.0, 1.0, 0.0]), abstol = 1e-14);
}

#[test]
fn eval_on_combined_samples() {
    let a = line("X", &[0.0, 1.0], LineRule::Bezier(2)).unwrap();
    let b = line("X", &[2.0, 4.0], LineRule::Bezier(3)).unwrap();
    let x = Function::geometry("X", 1);

    let sum = a.add(&b).unwrap();
    let results = sum.eval(&[x.clone()], &Arguments::new()).unwrap();
    assert_approx_array_eq!(results[0], array(&[5, 1], &[0.0, 1.0, 2.0, 3.0, 4.0]), abstol = 1e-14);

    let taken = sum.take_elements(&[1]).unwrap();
    let results = taken.eval(&[x.clone()], &Arguments::new()).unwrap();
    assert_approx_array_eq!(results[0], array(&[3, 1], &[2.0, 3.0, 4.0]), abstol = 1e-14);

    let c = line("Y", &[10.0, 20.0], LineRule::Bezier(2)).unwrap();
    let product = a.multiply(&c).unwrap();
    let y = Function::geometry("Y", 1);
    let results = product.eval(&[x, y], &Arguments::new()).unwrap();
    assert_approx_array_eq!(results[0], array(&[4, 1], &[0.0, 0.0, 1.0, 1.0]), abstol = 1e-14);
    assert_approx_array_eq!(results[1], array(&[4, 1], &[10.0, 20.0, 10.0, 20.0]), abstol = 1e-14);

    let empty = Sample::empty(vec!["X".to_string()], 1);
    let results = empty.eval(&[Function::geometry("X", 1)], &Arguments::new()).unwrap();
    assert_eq!(results[0].shape(), [0, 1]);
}

#[test]
fn eval_on_zipped_sample() {
    let x = line("X", &[0.0, 1.0, 2.0], LineRule::Uniform(2)).unwrap();
    let y = unit_segments(
        "Y",
        vec![Points::uniform_line(1), Points::uniform_line(2), Points::uniform_line(1)],
    )
    .unwrap();
    let zipped = Sample::zip(&[x.clone(), y.clone()]).unwrap();
    let funcs = [Function::geometry("X", 1), Function::geometry("Y", 1)];
    let zipped_values = zipped.eval(&funcs, &Arguments::new()).unwrap();
    let x_values = x.eval(&funcs[..1], &Arguments::new()).unwrap();
    let y_values = y.eval(&funcs[1..], &Arguments::new()).unwrap();
    assert_approx_array_eq!(zipped_values[0], x_values[0], abstol = 1e-14);
    assert_approx_array_eq!(zipped_values[1], y_values[0], abstol = 1e-14);
}

#[test]
fn eval_on_element_subset_of_sum() {
    let a = line("X", &[0.0, 1.0, 2.0], LineRule::Bezier(2)).unwrap();
    let b = line("X", &[4.0, 5.0, 6.0], LineRule::Bezier(2)).unwrap();
    let sum = a.add(&b).unwrap();
    let x = Function::geometry("X", 1);

    let taken = sum.take_elements(&[2, 0]).unwrap();
    assert_eq!(taken.index().unwrap(), vec![vec![0, 1], vec![2, 3]]);
    let results = taken.eval(&[x.clone()], &Arguments::new()).unwrap();
    assert_approx_array_eq!(results[0], array(&[4, 1], &[4.0, 5.0, 0.0, 1.0]), abstol = 1e-14);

    let taken = sum.take_elements(&[2, 0, 3]).unwrap();
    let results = taken.eval(&[x], &Arguments::new()).unwrap();
    assert_approx_array_eq!(
        results[0],
        array(&[6, 1], &[4.0, 5.0, 0.0, 1.0, 5.0, 6.0]),
        abstol = 1e-14
    );
}

#[test]
fn eval_on_zipped_sample_with_reordered_points() {
    // Y element `e` holds point `index[e]`, so the merged elements follow Y's elements
    let transforms = line_transforms(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
    let points = PointsSequence::uniform(Points::uniform_line(1), 4);
    let y = Sample::new("Y", vec![transforms], points, Some(vec![3, 0, 2, 1])).unwrap();
    let x = line("X", &[0.0, 1.0, 2.0, 3.0, 4.0], LineRule::Uniform(1)).unwrap();
    let zipped = Sample::zip(&[y.clone(), x.clone()]).unwrap();
    assert_eq!(zipped.index().unwrap(), vec![vec![3], vec![0], vec![2], vec![1]]);

    let funcs = [Function::geometry("X", 1), Function::geometry("Y", 1)];
    let zipped_values = zipped.eval(&funcs, &Arguments::new()).unwrap();
    let x_values = x.eval(&funcs[..1], &Arguments::new()).unwrap();
    let y_values = y.eval(&funcs[1..], &Arguments::new()).unwrap();
    assert_approx_array_eq!(zipped_values[0], x_values[0], abstol = 1e-14);
    assert_approx_array_eq!(zipped_values[1], y_values[0], abstol = 1e-14);
    assert_approx_array_eq!(zipped_values[0], array(&[4, 1], &[0.5, 1.5, 2.5, 3.5]), abstol = 1e-14);
    assert_approx_array_eq!(zipped_values[1], array(&[4, 1], &[1.5, 3.5, 2.5, 0.5]), abstol = 1e-14);
}

#[test]
fn eval_missing_space_fails() {
    let sample = line("X", &[0.0, 1.0], LineRule::Gauss(1)).unwrap();
    let err = sample
        .eval(&[Function::geometry("Y", 1)], &Arguments::new())
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<SampleError>(),
        Some(&SampleError::MissingSpace("Y".to_string()))
    );
}

#[test]
fn basis_is_identity_on_own_points() {
    let sample = line("X", &[0.0, 1.0, 3.0], LineRule::Gauss(2)).unwrap();
    let basis = sample.basis(Interpolation::None).unwrap();
    assert_eq!(basis.shape(), [4]);
    let results = sample.eval(&[basis], &Arguments::new()).unwrap();
    let identity = ArrayD::from_shape_fn(ndarray::IxDyn(&[4, 4]), |index| {
        if index[0] == index[1] {
            1.0
        } else {
            0.0
        }
    });
    assert_approx_array_eq!(results[0], identity, abstol = 0.0);
}

#[test]
fn basis_of_product_is_kronecker_product() {
    let square = rectilinear(&[("X", &[0.0, 1.0][..]), ("Y", &[0.0, 1.0][..])], LineRule::Gauss(2)).unwrap();
    let basis = square.basis(Interpolation::None).unwrap();
    assert_eq!(basis.shape(), [4]);
    let values = array(&[4], &[1.0, 2.0, 3.0, 4.0]);
    let func = square.asfunction(values.clone(), Interpolation::None).unwrap();
    let results = square.eval(&[func], &Arguments::new()).unwrap();
    assert_approx_array_eq!(results[0], values, abstol = 1e-14);
}

#[test]
fn asfunction_with_nearest_interpolation_on_refined_sample() {
    let coarse = line("X", &[0.0, 1.0], LineRule::Bezier(2)).unwrap();
    let func = coarse
        .asfunction(array(&[2], &[10.0, 20.0]), Interpolation::Nearest)
        .unwrap();

    let fine_transforms = bisect(&line_transforms(&[0.0, 1.0]).unwrap()).unwrap();
    let fine_points = PointsSequence::uniform(Points::bezier_line(2), 2);
    let fine = Sample::new("X", vec![fine_transforms], fine_points, None).unwrap();
    let results = fine.eval(&[func.clone()], &Arguments::new()).unwrap();
    // The midpoint is equally close to both coarse points
    assert_approx_array_eq!(results[0], array(&[4], &[10.0, 15.0, 15.0, 20.0]), abstol = 1e-14);

    let strict = coarse
        .asfunction(array(&[2], &[10.0, 20.0]), Interpolation::None)
        .unwrap();
    assert!(fine.eval(&[strict], &Arguments::new()).is_err());
}

#[test]
fn basis_of_unsupported_variants() {
    let x = line("X", &[0.0, 1.0], LineRule::Uniform(2)).unwrap();
    let y = line("Y", &[0.0, 1.0], LineRule::Uniform(2)).unwrap();
    let zipped = Sample::zip(&[x, y]).unwrap();
    assert!(matches!(
        zipped.basis(Interpolation::None).unwrap_err(),
        SampleError::NotImplemented {
            operation: "basis",
            ..
        }
    ));

    let empty = Sample::empty(vec!["X".to_string()], 1);
    assert_eq!(empty.basis(Interpolation::None).unwrap().shape(), [0]);
}

#[test]
fn parallel_interpreter_agrees_with_sequential() {
    let sample = line("X", &[0.0, 0.5, 1.5, 2.0, 4.0], LineRule::Gauss(3)).unwrap();
    let x = Function::geometry("X", 1);
    let funcs = [x.multiply(&Function::jacobian("X")).unwrap(), x.outer(&x)];
    let sequential = sample
        .integrate_with(&Interpreter::default(), &funcs, &Arguments::new())
        .unwrap();
    let parallel = sample
        .integrate_with(&Interpreter::parallel(), &funcs, &Arguments::new())
        .unwrap();
    for (s, p) in sequential.iter().zip(&parallel) {
        assert_approx_array_eq!(s.to_dense(), p.to_dense(), abstol = 1e-12);
    }
}

proptest! {
    #[test]
    fn integral_of_jacobian_is_line_length(vertices in line_vertices(5), n in 1..4usize) {
        let sample = line("X", &vertices, LineRule::Gauss(n)).unwrap();
        let results = sample.integrate(&[Function::jacobian("X")], &Arguments::new()).unwrap();
        let length = vertices[vertices.len() - 1] - vertices[0];
        prop_assert!((scalar(&results[0].to_dense()) - length).abs() <= 1e-10);
    }

    #[test]
    fn eval_basis_round_trips_point_values(sample in line_sample("X", 5), seed in 0.0..1.0f64) {
        let values = ArrayD::from_shape_fn(ndarray::IxDyn(&[sample.npoints()]), |i| seed + i[0] as f64);
        let func = sample.asfunction(values.clone(), Interpolation::None).unwrap();
        let results = sample.eval(&[func], &Arguments::new()).unwrap();
        assert_approx_array_eq!(results[0], values, abstol = 1e-12);
    }
}
