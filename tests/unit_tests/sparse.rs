use fenris_sample::sparse::{Assembled, SparseTensor};
use fenris_sample::SampleError;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use util::array;

#[test]
fn try_from_parts_validates_indices() {
    let tensor = SparseTensor::try_from_parts(vec![2, 3], vec![vec![0, 1], vec![2, 2]], vec![1.0, 2.0]).unwrap();
    assert_eq!(tensor.ndim(), 2);
    assert_eq!(tensor.nnz(), 2);
    assert_eq!(tensor.indices(1), [2, 2]);

    assert_eq!(
        SparseTensor::try_from_parts(vec![2, 3], vec![vec![0, 2], vec![0, 0]], vec![1.0, 2.0]).unwrap_err(),
        SampleError::IndexOutOfRange { index: 2, len: 2 }
    );
    assert!(SparseTensor::try_from_parts(vec![2], vec![vec![0]], vec![1.0, 2.0]).is_err());
    assert!(SparseTensor::try_from_parts(vec![2, 2], vec![vec![0]], vec![1.0]).is_err());
}

#[test]
fn dedup_sums_duplicates_in_lexicographic_order() {
    let tensor = SparseTensor::try_from_parts(
        vec![2, 2, 2],
        vec![vec![1, 0, 1, 0], vec![0, 1, 0, 0], vec![1, 0, 1, 1]],
        vec![1.0, 2.0, 3.0, 4.0],
    )
    .unwrap();
    let deduped = tensor.dedup();
    assert_eq!(deduped.nnz(), 3);
    assert_eq!(deduped.indices(0), [0, 0, 1]);
    assert_eq!(deduped.indices(1), [0, 1, 0]);
    assert_eq!(deduped.indices(2), [1, 0, 1]);
    assert_eq!(deduped.values(), [4.0, 2.0, 4.0]);
    assert_eq!(deduped.to_dense(), tensor.to_dense());
}

#[test]
fn prune_removes_zeros() {
    let tensor = SparseTensor::from_dense(&array(&[2, 2], &[0.0, 1.0, 0.0, 2.0]));
    assert_eq!(tensor.nnz(), 4);
    let pruned = tensor.prune();
    assert_eq!(pruned.nnz(), 2);
    assert_eq!(pruned.values(), [1.0, 2.0]);
    assert_eq!(pruned.to_dense(), tensor.to_dense());
}

#[test]
fn to_csr_sums_duplicates() {
    let tensor = SparseTensor::try_from_parts(vec![2, 3], vec![vec![0, 1, 0], vec![2, 0, 2]], vec![1.0, 5.0, 2.0]).unwrap();
    let csr = tensor.to_csr().unwrap();
    let expected = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 3.0, 5.0, 0.0, 0.0]);
    assert_matrix_eq!(DMatrix::from(&csr), expected);

    let vector = SparseTensor::from_dense(&array(&[2], &[1.0, 2.0]));
    assert!(vector.to_csr().is_err());
}

#[test]
fn assemble_by_rank() {
    let scalar = SparseTensor::from_dense(&array(&[], &[3.0]));
    assert!(matches!(scalar.assemble().unwrap(), Assembled::Dense(_)));

    let matrix = SparseTensor::from_dense(&array(&[1, 2], &[1.0, 0.0]));
    let assembled = matrix.assemble().unwrap();
    assert!(assembled.as_matrix().is_some());
    assert_eq!(assembled.to_dense(), array(&[1, 2], &[1.0, 0.0]));

    let tensor = SparseTensor::from_dense(&array(&[1, 1, 2], &[0.0, 7.0]));
    let assembled = tensor.assemble().unwrap();
    let sparse = assembled.as_sparse().unwrap();
    assert_eq!(sparse.nnz(), 1);
    assert!(assembled.as_dense().is_none());
}

#[test]
fn serialize_roundtrip() {
    let tensor = SparseTensor::try_from_parts(vec![3], vec![vec![2]], vec![1.5]).unwrap();
    let json = serde_json::to_string(&tensor).unwrap();
    let restored: SparseTensor = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, tensor);
}
