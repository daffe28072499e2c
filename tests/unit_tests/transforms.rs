use fenris_sample::transforms::{apply_chain, chain_jacobian, TransformChain, TransformItem, Transforms};
use fenris_sample::SampleError;
use nalgebra::{DMatrix, DVector};
use util::assert_approx_matrix_eq;

fn edge(scale: f64, shift: f64) -> TransformItem {
    TransformItem::scale_and_shift(scale, &[shift])
}

#[test]
fn apply_chain_maps_leaf_edge_first() {
    let chain = [edge(2.0, 1.0), edge(0.5, 0.5)];
    let coords = DMatrix::from_column_slice(3, 1, &[0.0, 0.5, 1.0]);
    let mapped = apply_chain(&chain, &coords);
    // x -> 2 (0.5 x + 0.5) + 1
    let expected = DMatrix::from_column_slice(3, 1, &[2.0, 2.5, 3.0]);
    assert_approx_matrix_eq!(&mapped, &expected, abstol = 1e-15);
    assert!((chain_jacobian(&chain, 1) - 1.0).abs() <= 1e-15);
}

#[test]
fn jacobian_of_embedded_edge() {
    // The segment from (0, 0) to (3, 4) in the plane
    let item = TransformItem::new(&DMatrix::from_column_slice(2, 1, &[3.0, 4.0]), &DVector::zeros(2)).unwrap();
    assert!((chain_jacobian(&[item], 2) - 5.0).abs() <= 1e-14);

    let mismatch = TransformItem::new(&DMatrix::zeros(2, 1), &DVector::zeros(3));
    assert!(matches!(mismatch.unwrap_err(), SampleError::ShapeMismatch { .. }));
}

#[test]
fn transforms_validate_dimensions() {
    let chain: TransformChain = vec![edge(1.0, 0.0)].into();
    assert!(Transforms::from_chains(1, 1, vec![chain.clone()]).is_ok());
    assert!(Transforms::from_chains(2, 1, vec![chain]).is_err());
}

#[test]
fn index_with_tail_finds_longest_prefix() {
    let coarse = Transforms::from_chains(
        1,
        1,
        vec![vec![edge(1.0, 0.0)].into(), vec![edge(1.0, 1.0)].into()],
    )
    .unwrap();
    let fine = coarse.refined(&[edge(0.5, 0.0), edge(0.5, 0.5)]).unwrap();
    assert_eq!(fine.len(), 4);

    for (ifine, chain) in fine.chains().iter().enumerate() {
        assert_eq!(coarse.index_with_tail(chain), Some((ifine / 2, 1)));
        assert_eq!(fine.index_with_tail(chain), Some((ifine, 2)));
    }
    assert_eq!(coarse.index_with_tail(&[edge(1.0, 2.0)]), None);

    let taken = fine.take(&[3, 0]).unwrap();
    assert_eq!(taken.get(0), fine.get(3));
    assert!(fine.take(&[4]).unwrap_err().is_index_error());
}
