//! Backend selection for the per-frequency linear solves

use log::{debug, warn};
use nalgebra::{ComplexField, DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

use super::{AnalysisOptions, SolverBackend};
use crate::math::SkylineSolver;

/// Relative pivot tolerance of the profile factorization
const PIVOT_TOL: f64 = 1e-13;

/// Solves A·x = b for sparse real or complex systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearSolver {
    pub backend: SolverBackend,
    pub dense_threshold: usize,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Auto,
            dense_threshold: 1200,
        }
    }
}

impl LinearSolver {
    pub fn new(backend: SolverBackend, dense_threshold: usize) -> Self {
        Self {
            backend,
            dense_threshold,
        }
    }

    pub fn from_options(options: &AnalysisOptions) -> Self {
        Self::new(options.backend, options.dense_threshold)
    }

    /// Whether a system of `n` unknowns goes to the dense LU
    pub fn uses_dense(&self, n: usize) -> bool {
        match self.backend {
            SolverBackend::Dense => true,
            SolverBackend::Skyline => false,
            SolverBackend::Auto => n <= self.dense_threshold,
        }
    }

    /// Solve a square system; the error names the failure
    pub fn solve<T>(&self, a: &CsrMatrix<T>, b: &DVector<T>) -> Result<DVector<T>, String>
    where
        T: ComplexField<RealField = f64> + Copy + Default,
    {
        let n = a.nrows();
        if n == 0 {
            return Ok(DVector::from_element(0, T::zero()));
        }
        if self.uses_dense(n) {
            return solve_dense(a, b);
        }

        let mut skyline = SkylineSolver::new(a);
        match skyline.factorize(PIVOT_TOL) {
            Ok(()) => {
                debug!("profile LU of {} unknowns, {} stored entries", n, skyline.profile_len());
                skyline
                    .solve(b)
                    .ok_or_else(|| "profile solve failed".to_string())
            }
            Err(reason) if self.backend == SolverBackend::Auto => {
                warn!("{}, retrying with dense LU", reason);
                solve_dense(a, b)
            }
            Err(reason) => Err(reason),
        }
    }
}

fn solve_dense<T>(a: &CsrMatrix<T>, b: &DVector<T>) -> Result<DVector<T>, String>
where
    T: ComplexField<RealField = f64> + Copy + Default,
{
    let n = a.nrows();
    let mut dense = DMatrix::from_element(n, a.ncols(), T::zero());
    for (row, col, &value) in a.triplet_iter() {
        dense[(row, col)] += value;
    }
    let lu = dense.lu();
    let pivots: Vec<f64> = lu.u().diagonal().iter().map(|d| d.modulus()).collect();
    let scale = pivots.iter().copied().fold(0.0_f64, f64::max);
    if pivots.iter().any(|p| *p <= PIVOT_TOL * scale) {
        return Err("matrix is singular".to_string());
    }
    let x = lu.solve(b).ok_or_else(|| "matrix is singular".to_string())?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err("solution is not finite".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SparseMatrixBuilder;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn tridiagonal(n: usize) -> CsrMatrix<Complex64> {
        let mut builder = SparseMatrixBuilder::new(n);
        for i in 0..n {
            builder.add(i, i, Complex64::new(4.0, 0.5));
            if i + 1 < n {
                builder.add(i, i + 1, Complex64::new(-1.0, 0.0));
                builder.add(i + 1, i, Complex64::new(-1.5, 0.1));
            }
        }
        builder.to_csr().unwrap()
    }

    #[test]
    fn test_backends_agree() {
        let a = tridiagonal(30);
        let b = DVector::from_fn(30, |i, _| Complex64::new(i as f64, 1.0));
        let dense = LinearSolver::new(SolverBackend::Dense, 0).solve(&a, &b).unwrap();
        let skyline = LinearSolver::new(SolverBackend::Skyline, 0).solve(&a, &b).unwrap();
        for (x, y) in dense.iter().zip(skyline.iter()) {
            assert_relative_eq!(x.re, y.re, epsilon = 1e-10);
            assert_relative_eq!(x.im, y.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_auto_threshold() {
        let solver = LinearSolver::new(SolverBackend::Auto, 10);
        assert!(solver.uses_dense(10));
        assert!(!solver.uses_dense(11));
    }

    #[test]
    fn test_zero_pivot_falls_back_to_dense() {
        // Leading zero pivot breaks the unpivoted profile LU but not the dense LU
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 1, 1.0);
        builder.add(1, 0, 1.0);
        builder.add(1, 1, 2.0);
        let a = builder.to_csr().unwrap();
        let b = DVector::from_vec(vec![3.0, 5.0]);

        let x = LinearSolver::new(SolverBackend::Auto, 0).solve(&a, &b).unwrap();
        assert_relative_eq!(x[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
        assert!(LinearSolver::new(SolverBackend::Skyline, 0).solve(&a, &b).is_err());
    }

    #[test]
    fn test_singular_system_is_reported() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 1.0);
        builder.add(0, 1, 1.0);
        builder.add(1, 0, 1.0);
        builder.add(1, 1, 1.0);
        let b = DVector::from_vec(vec![1.0, 0.0]);
        assert!(LinearSolver::new(SolverBackend::Dense, 0).solve(&builder.to_csr().unwrap(), &b).is_err());
    }
}
