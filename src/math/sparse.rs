//! Sparse matrix utilities for global assembly
//!
//! Global pipe-network matrices are banded and very sparse. Entries are
//! accumulated as triplets and compressed to CSR once per assembly.

use std::ops::{AddAssign, Mul};

use nalgebra::{DVector, Scalar};
use nalgebra_sparse::CsrMatrix;

use crate::error::{FemError, FemResult};

/// Sparse matrix builder using COO triplets
///
/// Duplicate (row, col) entries are summed when the matrix is compressed.
#[derive(Debug, Clone)]
pub struct SparseMatrixBuilder<T> {
    nrows: usize,
    ncols: usize,
    entries: Vec<(usize, usize, T)>,
}

impl<T> SparseMatrixBuilder<T>
where
    T: Scalar + Copy + Default + AddAssign,
{
    /// Create a square builder
    pub fn new(size: usize) -> Self {
        Self::rectangular(size, size)
    }

    /// Create a builder with an arbitrary shape
    pub fn rectangular(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: Vec::with_capacity(nrows.max(ncols) * 12),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Add a value to the matrix (accumulates if already exists)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: T) {
        if value != T::default() {
            self.entries.push((row, col, value));
        }
    }

    /// Scatter a dense element block through its DOF map
    ///
    /// `value(i, j)` returns the element entry for local row `i` and column `j`.
    pub fn add_element<F>(&mut self, dofs: &[usize], value: F)
    where
        F: Fn(usize, usize) -> T,
    {
        for (i, &di) in dofs.iter().enumerate() {
            for (j, &dj) in dofs.iter().enumerate() {
                self.add(di, dj, value(i, j));
            }
        }
    }

    /// Append the triplets of another builder of the same shape
    pub fn merge(&mut self, other: SparseMatrixBuilder<T>) {
        self.entries.extend(other.entries);
    }

    /// Number of stored triplets (before summing duplicates)
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Compress to CSR, summing duplicates
    pub fn to_csr(&self) -> FemResult<CsrMatrix<T>> {
        if let Some(&(row, col, _)) = self
            .entries
            .iter()
            .find(|(row, col, _)| *row >= self.nrows || *col >= self.ncols)
        {
            return Err(FemError::SparsePattern(format!(
                "entry ({}, {}) outside a {}x{} matrix",
                row, col, self.nrows, self.ncols
            )));
        }

        let mut sorted = self.entries.clone();
        sorted.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_offsets = vec![0usize; self.nrows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, value) in sorted {
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += value;
                }
                continue;
            }
            row_offsets[row + 1] += 1;
            col_indices.push(col);
            values.push(value);
            last = Some((row, col));
        }

        for row in 0..self.nrows {
            row_offsets[row + 1] += row_offsets[row];
        }

        CsrMatrix::try_from_csr_data(self.nrows, self.ncols, row_offsets, col_indices, values)
            .map_err(|err| FemError::SparsePattern(err.to_string()))
    }
}

/// Extract the sub-matrix addressed by `rows` x `cols`
///
/// Index lists must be free of duplicates; their order sets the order of the
/// sub-matrix rows and columns.
pub fn extract_block<T>(csr: &CsrMatrix<T>, rows: &[usize], cols: &[usize]) -> FemResult<CsrMatrix<T>>
where
    T: Scalar + Copy + Default + AddAssign,
{
    if rows.iter().any(|&r| r >= csr.nrows()) || cols.iter().any(|&c| c >= csr.ncols()) {
        return Err(FemError::SparsePattern(format!(
            "block index outside a {}x{} matrix",
            csr.nrows(),
            csr.ncols()
        )));
    }

    let mut col_map: Vec<Option<usize>> = vec![None; csr.ncols()];
    for (local, &global) in cols.iter().enumerate() {
        col_map[global] = Some(local);
    }

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut builder = SparseMatrixBuilder::rectangular(rows.len(), cols.len());
    for (local_row, &global_row) in rows.iter().enumerate() {
        for idx in row_offsets[global_row]..row_offsets[global_row + 1] {
            if let Some(local_col) = col_map[col_indices[idx]] {
                builder.add(local_row, local_col, values[idx]);
            }
        }
    }
    builder.to_csr()
}

/// Sparse matrix-vector multiplication y = A·x
///
/// The vector may have a different scalar type than the matrix (real matrix
/// times complex vector).
#[inline]
pub fn sparse_matvec<T, X>(csr: &CsrMatrix<T>, x: &DVector<X>) -> DVector<X>
where
    T: Copy,
    X: Scalar + Copy + Default + AddAssign + Mul<T, Output = X>,
{
    let n = csr.nrows();
    let mut y = DVector::from_element(n, X::default());

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    for row in 0..n {
        let mut sum = X::default();
        for idx in row_offsets[row]..row_offsets[row + 1] {
            sum += x[col_indices[idx]] * values[idx];
        }
        y[row] = sum;
    }

    y
}

/// Diagonal entries of a square sparse matrix
pub fn diagonal<T>(csr: &CsrMatrix<T>) -> Vec<T>
where
    T: Copy + Default,
{
    let mut diag = vec![T::default(); csr.nrows()];
    for (row, col, &val) in csr.triplet_iter() {
        if row == col {
            diag[row] = val;
        }
    }
    diag
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use num_complex::Complex64;

    #[test]
    fn test_duplicates_are_summed() {
        let mut builder = SparseMatrixBuilder::new(3);
        builder.add(0, 0, 4.0);
        builder.add(1, 1, 3.0);
        builder.add(0, 0, 1.5);
        builder.add(2, 1, 1.0);
        builder.add(1, 1, -1.0);

        let csr = builder.to_csr().unwrap();
        assert_eq!(csr.nnz(), 3);
        let dense: DMatrix<f64> = DMatrix::from(&csr);
        assert!((dense[(0, 0)] - 5.5).abs() < 1e-14);
        assert!((dense[(1, 1)] - 2.0).abs() < 1e-14);
        assert!((dense[(2, 1)] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_block_extraction() {
        let mut builder = SparseMatrixBuilder::new(4);
        for i in 0..4 {
            for j in 0..4 {
                builder.add(i, j, (10 * i + j) as f64);
            }
        }
        let csr = builder.to_csr().unwrap();
        let block = extract_block(&csr, &[3, 1], &[0, 2]).unwrap();
        let dense = DMatrix::from(&block);
        assert_eq!(dense.shape(), (2, 2));
        assert_eq!(dense[(0, 0)], 30.0);
        assert_eq!(dense[(0, 1)], 32.0);
        assert_eq!(dense[(1, 0)], 10.0);
        assert_eq!(dense[(1, 1)], 12.0);
    }

    #[test]
    fn test_real_matrix_complex_vector() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 2.0);
        builder.add(0, 1, 1.0);
        builder.add(1, 1, 3.0);
        let csr = builder.to_csr().unwrap();
        let x = DVector::from_vec(vec![Complex64::new(1.0, 1.0), Complex64::new(0.0, 2.0)]);
        let y = sparse_matvec(&csr, &x);
        assert_eq!(y[0], Complex64::new(2.0, 4.0));
        assert_eq!(y[1], Complex64::new(0.0, 6.0));
    }

    #[test]
    fn test_out_of_range_entry_is_rejected() {
        let mut builder = SparseMatrixBuilder::rectangular(2, 3);
        builder.add(0, 2, 1.0);
        builder.add(2, 0, 1.0);
        let err = builder.to_csr().unwrap_err();
        assert!(matches!(err, FemError::SparsePattern(_)));
        assert!(err.to_string().contains("(2, 0)"));

        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(1, 1, 1.0);
        let csr = builder.to_csr().unwrap();
        assert!(extract_block(&csr, &[0, 2], &[1]).is_err());
    }
}
