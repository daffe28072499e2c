//! Index bookkeeping helpers shared by samples and points.
use nalgebra::DMatrix;

/// Cumulative offsets `[0, c0, c0 + c1, ...]` of the given counts.
///
/// The result has one more entry than `counts`.
pub fn offsets_from_counts(counts: impl IntoIterator<Item = usize>) -> Vec<usize> {
    let mut offsets = vec![0];
    let mut sum = 0;
    for count in counts {
        sum += count;
        offsets.push(sum);
    }
    offsets
}

/// Stacks index tables with `ncols` columns on top of each other.
pub fn stack_rows<'a>(tables: impl IntoIterator<Item = &'a DMatrix<usize>>, ncols: usize) -> DMatrix<usize> {
    let mut entries = Vec::new();
    let mut nrows = 0;
    for table in tables {
        assert_eq!(table.ncols(), ncols, "All index tables must have the same number of columns");
        for row in table.row_iter() {
            entries.extend(row.iter().copied());
        }
        nrows += table.nrows();
    }
    DMatrix::from_row_slice(nrows, ncols, &entries)
}

/// Maps every entry of `table` through `index`.
pub fn take_entries(index: &[usize], table: &DMatrix<usize>) -> DMatrix<usize> {
    table.map(|i| index[i])
}

/// Tensor product of the simplices of a one-dimensional triangulation with an arbitrary one.
///
/// `simplices1` either holds line segments (two columns) or vertices (one column).
/// Point `(i, j)` of the product is numbered `i * npoints2 + j`. A segment times a `k`-vertex
/// simplex yields the prism `[a0 * n2 + b.., a1 * n2 + b..]`, which is split into `k` simplices
/// of `k + 1` vertices by taking all windows of length `k + 1`. A vertex times a simplex
/// yields a single simplex.
pub fn extrude_simplices(simplices1: &DMatrix<usize>, simplices2: &DMatrix<usize>, npoints2: usize) -> DMatrix<usize> {
    let k = simplices2.ncols();
    let mut entries = Vec::new();
    let mut nrows = 0;
    let ncols = match simplices1.ncols() {
        1 => k,
        2 => k + 1,
        n => panic!("Extrusion requires vertices or segments, got simplices with {} vertices", n),
    };

    for row1 in simplices1.row_iter() {
        for row2 in simplices2.row_iter() {
            let prism: Vec<usize> = row1
                .iter()
                .flat_map(|&a| row2.iter().map(move |&b| a * npoints2 + b))
                .collect();
            if simplices1.ncols() == 1 {
                entries.extend_from_slice(&prism);
                nrows += 1;
            } else {
                for window in prism.windows(k + 1) {
                    entries.extend_from_slice(window);
                    nrows += 1;
                }
            }
        }
    }

    DMatrix::from_row_slice(nrows, ncols, &entries)
}

/// Replaces every value by its rank among all values, so that the result is a permutation of
/// `0 .. values.len()` with the same relative order as `values`.
pub fn ranks(values: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| (values[i], i));
    let mut ranks = vec![0; values.len()];
    for (rank, i) in order.into_iter().enumerate() {
        ranks[i] = rank;
    }
    ranks
}
