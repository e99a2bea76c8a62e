//! Skyline (profile) LU factorization
//!
//! Line-element meshes numbered by graph traversal give narrow, symmetric
//! profiles. The factorization keeps the profile: row `i` of `L` and column
//! `i` of `U` start at the first structurally non-zero column of row `i`.
//! No pivoting is performed; a vanishing pivot is reported so the caller can
//! fall back to a dense LU.

use nalgebra::{ComplexField, DVector};
use nalgebra_sparse::CsrMatrix;

/// Profile LU solver for real or complex square matrices
#[derive(Debug, Clone)]
pub struct SkylineSolver<T> {
    size: usize,
    // First column of the profile for each row
    start: Vec<usize>,
    // Strict lower part of L, row-wise over start[i]..i (unit diagonal)
    lower: Vec<Vec<T>>,
    // Upper part of U, column-wise over start[i]..=i
    upper: Vec<Vec<T>>,
    factorized: bool,
}

impl<T> SkylineSolver<T>
where
    T: ComplexField<RealField = f64> + Copy,
{
    /// Load a CSR matrix into profile storage
    pub fn new(csr: &CsrMatrix<T>) -> Self {
        let size = csr.nrows();

        let mut start: Vec<usize> = (0..size).collect();
        for (row, col, _) in csr.triplet_iter() {
            let (lo, hi) = if row < col { (row, col) } else { (col, row) };
            if lo < start[hi] {
                start[hi] = lo;
            }
        }

        let mut lower: Vec<Vec<T>> = (0..size).map(|i| vec![T::zero(); i - start[i]]).collect();
        let mut upper: Vec<Vec<T>> = (0..size).map(|i| vec![T::zero(); i - start[i] + 1]).collect();

        for (row, col, &val) in csr.triplet_iter() {
            if col < row {
                lower[row][col - start[row]] += val;
            } else {
                upper[col][row - start[col]] += val;
            }
        }

        Self {
            size,
            start,
            lower,
            upper,
            factorized: false,
        }
    }

    /// Number of stored profile entries
    pub fn profile_len(&self) -> usize {
        self.lower.iter().map(Vec::len).sum::<usize>() + self.upper.iter().map(Vec::len).sum::<usize>()
    }

    #[inline]
    fn l(&self, row: usize, col: usize) -> T {
        if col < self.start[row] {
            T::zero()
        } else {
            self.lower[row][col - self.start[row]]
        }
    }

    #[inline]
    fn u(&self, row: usize, col: usize) -> T {
        if row < self.start[col] {
            T::zero()
        } else {
            self.upper[col][row - self.start[col]]
        }
    }

    /// Factorize in place (Doolittle, row by row)
    ///
    /// `pivot_tol` is relative to the largest stored diagonal magnitude.
    pub fn factorize(&mut self, pivot_tol: f64) -> Result<(), String> {
        let scale = (0..self.size)
            .map(|i| self.upper[i][i - self.start[i]].modulus())
            .fold(0.0_f64, f64::max)
            .max(f64::MIN_POSITIVE);

        for i in 0..self.size {
            let si = self.start[i];

            for j in si..i {
                let sj = self.start[j];
                let k0 = si.max(sj);

                // L[i,j]
                let mut sum_l = T::zero();
                for k in k0..j {
                    sum_l += self.l(i, k) * self.u(k, j);
                }
                let pivot = self.upper[j][j - sj];
                let idx = j - si;
                self.lower[i][idx] = (self.lower[i][idx] - sum_l) / pivot;

                // U[j,i]
                let mut sum_u = T::zero();
                for k in k0..j {
                    sum_u += self.l(j, k) * self.u(k, i);
                }
                self.upper[i][idx] -= sum_u;
            }

            let mut sum_d = T::zero();
            for k in si..i {
                sum_d += self.l(i, k) * self.u(k, i);
            }
            let d = i - si;
            self.upper[i][d] -= sum_d;

            if self.upper[i][d].modulus() <= pivot_tol * scale {
                return Err(format!("zero pivot at equation {}", i));
            }
        }

        self.factorized = true;
        Ok(())
    }

    /// Solve L·U·x = b with a factorized matrix
    pub fn solve(&self, b: &DVector<T>) -> Option<DVector<T>> {
        if !self.factorized || b.len() != self.size {
            return None;
        }
        let mut x = b.clone();

        // Forward substitution: L * y = b
        for i in 0..self.size {
            let si = self.start[i];
            let mut sum = T::zero();
            for k in si..i {
                sum += self.lower[i][k - si] * x[k];
            }
            x[i] -= sum;
        }

        // Backward substitution: U * x = y, column oriented
        for i in (0..self.size).rev() {
            let si = self.start[i];
            x[i] /= self.upper[i][i - si];
            let xi = x[i];
            for k in si..i {
                x[k] -= self.upper[i][k - si] * xi;
            }
        }

        Some(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::sparse::SparseMatrixBuilder;
    use nalgebra::DMatrix;
    use num_complex::Complex64;

    #[test]
    fn test_real_spd_tridiagonal() {
        let mut builder = SparseMatrixBuilder::new(3);
        builder.add(0, 0, 4.0);
        builder.add(0, 1, -1.0);
        builder.add(1, 0, -1.0);
        builder.add(1, 1, 4.0);
        builder.add(1, 2, -1.0);
        builder.add(2, 1, -1.0);
        builder.add(2, 2, 4.0);
        let csr = builder.to_csr().unwrap();

        let mut solver = SkylineSolver::new(&csr);
        solver.factorize(1e-14).unwrap();
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = solver.solve(&b).unwrap();

        let dense = DMatrix::from(&csr);
        assert!((dense * x - b).norm() < 1e-12);
    }

    #[test]
    fn test_complex_unsymmetric() {
        let c = |re: f64, im: f64| Complex64::new(re, im);
        let mut builder = SparseMatrixBuilder::new(4);
        builder.add(0, 0, c(3.0, 1.0));
        builder.add(0, 1, c(-1.0, 0.5));
        builder.add(1, 0, c(0.5, 0.0));
        builder.add(1, 1, c(2.0, -1.0));
        builder.add(1, 3, c(0.0, 1.0));
        builder.add(3, 1, c(1.0, 1.0));
        builder.add(2, 2, c(5.0, 0.0));
        builder.add(3, 3, c(4.0, 2.0));
        builder.add(2, 3, c(-1.0, 0.0));
        let csr = builder.to_csr().unwrap();

        let mut solver = SkylineSolver::new(&csr);
        solver.factorize(1e-14).unwrap();
        let b = DVector::from_vec(vec![c(1.0, 0.0), c(0.0, 1.0), c(2.0, -1.0), c(0.5, 0.5)]);
        let x = solver.solve(&b).unwrap();

        let dense = DMatrix::from(&csr);
        assert!((dense * x - b).norm() < 1e-12);
    }

    #[test]
    fn test_zero_pivot_detected() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 1, 1.0);
        builder.add(1, 0, 1.0);
        builder.add(1, 1, 1.0);
        let csr = builder.to_csr().unwrap();
        let mut solver = SkylineSolver::new(&csr);
        assert!(solver.factorize(1e-14).is_err());
    }
}
