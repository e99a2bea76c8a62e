//! Generalized symmetric eigen solvers for modal analysis
//!
//! Both solvers return the `num_modes` eigenpairs of K·φ = λ·M·φ nearest to
//! the shift σ, sorted by ascending |λ|, with M-normalized vectors.

use log::{debug, warn};
use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

use super::skyline::SkylineSolver;
use super::sparse::sparse_matvec;
use crate::error::{FemError, FemResult};

/// Breakdown tolerance of the Lanczos recurrence
const LANCZOS_TOL: f64 = 1e-12;

/// Eigenvalues with their eigenvectors stored column-wise
#[derive(Debug, Clone)]
pub struct EigenPairs {
    pub values: Vec<f64>,
    pub vectors: DMatrix<f64>,
}

impl EigenPairs {
    fn empty(n: usize) -> Self {
        Self {
            values: Vec::new(),
            vectors: DMatrix::zeros(n, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Keep the `num_modes` candidates nearest σ, then order them by |λ|
///
/// Natural frequencies are √|λ|/2π, so small negative eigenvalues of rigid
/// body modes sort next to their positive neighbours.
fn select_nearest(candidates: &mut Vec<(f64, DVector<f64>)>, num_modes: usize, sigma: f64) {
    candidates.sort_by(|a, b| (a.0 - sigma).abs().total_cmp(&(b.0 - sigma).abs()));
    candidates.truncate(num_modes);
    candidates.sort_by(|a, b| a.0.abs().total_cmp(&b.0.abs()));
}

fn into_pairs(candidates: Vec<(f64, DVector<f64>)>, n: usize) -> EigenPairs {
    let mut vectors = DMatrix::zeros(n, candidates.len());
    let mut values = Vec::with_capacity(candidates.len());
    for (i, (lambda, v)) in candidates.into_iter().enumerate() {
        vectors.set_column(i, &v);
        values.push(lambda);
    }
    EigenPairs { values, vectors }
}

/// Dense solve through the Cholesky factor of M
///
/// K·φ = λ·M·φ becomes (L⁻¹·K·L⁻ᵀ)·y = λ·y with φ = L⁻ᵀ·y.
pub fn generalized_eigen_dense(
    k: &DMatrix<f64>,
    m: &DMatrix<f64>,
    num_modes: usize,
    sigma: f64,
) -> FemResult<EigenPairs> {
    let n = k.nrows();
    if n == 0 || num_modes == 0 {
        return Ok(EigenPairs::empty(n));
    }

    let chol = match m.clone().cholesky() {
        Some(chol) => chol,
        None => {
            // Massless DOFs (e.g. rotations carried only by springs)
            let max_diag = m.diagonal().amax();
            let eps = 1e-9 * max_diag.max(1.0);
            warn!("mass matrix is singular, regularizing massless DOFs with {:.3e}", eps);
            let mut m_reg = m.clone();
            for i in 0..n {
                if m_reg[(i, i)].abs() < eps {
                    m_reg[(i, i)] = eps;
                }
            }
            m_reg.cholesky().ok_or_else(|| {
                FemError::EigenSolveFailed("mass matrix is not positive definite".to_string())
            })?
        }
    };

    let l_inv = chol
        .l()
        .try_inverse()
        .ok_or_else(|| FemError::EigenSolveFailed("Cholesky factor is singular".to_string()))?;

    let a = &l_inv * k * l_inv.transpose();
    let a = (&a + a.transpose()) * 0.5;

    let eig = SymmetricEigen::new(a);
    let l_inv_t = l_inv.transpose();

    let mut candidates: Vec<(f64, DVector<f64>)> = eig
        .eigenvalues
        .iter()
        .enumerate()
        .map(|(i, &lambda)| (lambda, &l_inv_t * eig.eigenvectors.column(i)))
        .collect();

    select_nearest(&mut candidates, num_modes, sigma);
    Ok(into_pairs(candidates, n))
}

/// Shift-invert Lanczos for the generalized eigenproblem K*x = λ*M*x
///
/// Uses shift-invert transformation: (K - σM)^(-1) * M * x = θ * x
/// where θ = 1/(λ - σ), so eigenvalues near σ become largest.
/// Full M-reorthogonalization keeps the basis clean for the modest number of
/// steps required by pipe models.
pub fn lanczos_shift_invert(
    k: &CsrMatrix<f64>,
    m: &CsrMatrix<f64>,
    num_modes: usize,
    sigma: f64,
) -> FemResult<EigenPairs> {
    let n = k.nrows();
    if n == 0 || num_modes == 0 {
        return Ok(EigenPairs::empty(n));
    }
    let num_lanczos = (2 * num_modes + 20).min(n);

    // Factor A = K - sigma * M
    let shifted = shifted_matrix(k, m, sigma)?;
    let mut factor = SkylineSolver::new(&shifted);
    let dense_fallback = match factor.factorize(1e-13) {
        Ok(()) => None,
        Err(reason) => {
            warn!("skyline factorization of K - σM failed ({}), using dense LU", reason);
            let lu = DMatrix::from(&shifted).lu();
            if !lu.is_invertible() {
                return Err(FemError::EigenSolveFailed(format!(
                    "K - σM is singular for σ = {}",
                    sigma
                )));
            }
            Some(lu)
        }
    };
    let apply_inverse = |rhs: &DVector<f64>| -> Option<DVector<f64>> {
        match &dense_fallback {
            Some(lu) => lu.solve(rhs),
            None => factor.solve(rhs),
        }
    };

    // Deterministic start vector
    let mut v_curr = DVector::from_fn(n, |i, _| ((i * 7 + 13) % 101) as f64 / 100.0 - 0.5);
    let mv = sparse_matvec(m, &v_curr);
    let norm = v_curr.dot(&mv).sqrt();
    if !(norm > 1e-14) {
        return Err(FemError::EigenSolveFailed(
            "start vector has zero mass norm".to_string(),
        ));
    }
    v_curr /= norm;
    let mut v_prev = DVector::zeros(n);

    let mut v_matrix = DMatrix::zeros(n, num_lanczos);
    // Cached M*v products for reorthogonalization
    let mut mv_matrix = DMatrix::zeros(n, num_lanczos);
    let mut alpha: Vec<f64> = Vec::with_capacity(num_lanczos);
    let mut beta: Vec<f64> = Vec::with_capacity(num_lanczos);

    for j in 0..num_lanczos {
        v_matrix.set_column(j, &v_curr);
        let mv_curr = sparse_matvec(m, &v_curr);
        mv_matrix.set_column(j, &mv_curr);

        let w = apply_inverse(&mv_curr).ok_or_else(|| {
            FemError::EigenSolveFailed("shift-invert solve failed".to_string())
        })?;

        let alpha_j = w.dot(&mv_curr);
        alpha.push(alpha_j);

        let mut w_orth = w - alpha_j * &v_curr;
        if j > 0 {
            w_orth -= beta[j - 1] * &v_prev;
        }

        for kk in 0..=j {
            let coeff = w_orth.dot(&mv_matrix.column(kk));
            w_orth -= coeff * v_matrix.column(kk);
        }

        let mw_orth = sparse_matvec(m, &w_orth);
        let beta_j = w_orth.dot(&mw_orth).max(0.0).sqrt();

        if beta_j < LANCZOS_TOL || j + 1 == num_lanczos {
            break;
        }

        beta.push(beta_j);
        v_prev = v_curr;
        v_curr = w_orth / beta_j;
    }

    let steps = alpha.len();
    debug!("Lanczos finished after {} steps for n = {}", steps, n);

    let mut t_mat = DMatrix::zeros(steps, steps);
    for i in 0..steps {
        t_mat[(i, i)] = alpha[i];
        if i + 1 < steps {
            t_mat[(i, i + 1)] = beta[i];
            t_mat[(i + 1, i)] = beta[i];
        }
    }

    let eig = SymmetricEigen::new(t_mat);
    let basis = v_matrix.columns(0, steps);

    let mut candidates: Vec<(f64, DVector<f64>)> = (0..steps)
        .filter(|&i| eig.eigenvalues[i].abs() > 1e-300)
        .map(|i| {
            let lambda = sigma + 1.0 / eig.eigenvalues[i];
            (lambda, basis * eig.eigenvectors.column(i))
        })
        .collect();

    if candidates.len() < num_modes.min(n) {
        warn!(
            "Lanczos produced {} of {} requested modes",
            candidates.len(),
            num_modes
        );
    }

    select_nearest(&mut candidates, num_modes, sigma);
    Ok(into_pairs(candidates, n))
}

fn shifted_matrix(k: &CsrMatrix<f64>, m: &CsrMatrix<f64>, sigma: f64) -> FemResult<CsrMatrix<f64>> {
    let mut builder = super::sparse::SparseMatrixBuilder::new(k.nrows());
    for (row, col, &val) in k.triplet_iter() {
        builder.add(row, col, val);
    }
    for (row, col, &val) in m.triplet_iter() {
        builder.add(row, col, -sigma * val);
    }
    builder.to_csr()
}
