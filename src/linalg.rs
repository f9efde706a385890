//! Factorization and solve primitives for the correlation matrix, with an
//! explicit least-squares fallback for ill-conditioned sample layouts.

use crate::errors::Result;
use linfa::Float;
use linfa_linalg::{cholesky::*, svd::*, triangular::*};
use log::debug;
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Smallest acceptable ratio between the extreme Cholesky pivots. Below this
/// the triangular solves no longer preserve the interpolation property and
/// the pseudo-inverse path takes over.
const PIVOT_RATIO_FLOOR: f64 = 1e-6;

/// Two-path solver for linear systems in the correlation matrix R.
///
/// The primary path is a Cholesky factorization. When R is indefinite or the
/// pivot ratio signals severe ill-conditioning, a truncated-SVD pseudo-inverse
/// is used instead so that training never fails on degenerate sample layouts.
#[derive(Debug, Clone)]
pub(crate) enum CorrFactorization<F: Float> {
    /// Lower Cholesky factor of R
    Cholesky(Array2<F>),
    /// Pseudo-inverse of R, with the log-determinant estimated from the
    /// clipped spectrum
    PseudoInverse { pinv: Array2<F>, logdet: F },
}

impl<F: Float> CorrFactorization<F> {
    /// Factorize `r`, selecting the fallback path when the Cholesky
    /// decomposition fails or its conditioning check does.
    pub fn compute(r: &Array2<F>) -> Result<Self> {
        if let Some(fac) = Self::try_cholesky(r) {
            return Ok(fac);
        }
        debug!("correlation matrix is ill-conditioned, falling back to least-squares solve");
        Self::least_squares(r)
    }

    fn try_cholesky(r: &Array2<F>) -> Option<Self> {
        let chol = r.cholesky().ok()?;
        let diag = chol.diag();
        let dmax = diag.iter().cloned().fold(F::neg_infinity(), F::max);
        let dmin = diag.iter().cloned().fold(F::infinity(), F::min);
        if dmin <= F::zero() || dmin < dmax * F::cast(PIVOT_RATIO_FLOOR) {
            return None;
        }
        Some(CorrFactorization::Cholesky(chol))
    }

    fn least_squares(r: &Array2<F>) -> Result<Self> {
        let (u, s, vt) = r.svd(true, true)?;
        // Both factors were requested above
        let (u, vt) = (u.unwrap(), vt.unwrap());
        let smax = s.iter().cloned().fold(F::zero(), F::max);
        let cutoff = smax * F::cast(r.nrows()) * F::epsilon();
        let s_inv = s.mapv(|v| if v > cutoff { F::one() / v } else { F::zero() });
        let pinv = vt.t().dot(&Array2::from_diag(&s_inv)).dot(&u.t());
        let logdet = s.mapv(|v| v.max(cutoff).ln()).sum();
        Ok(CorrFactorization::PseudoInverse { pinv, logdet })
    }

    /// Solve R x = b for every column of `b`.
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        match self {
            CorrFactorization::Cholesky(chol) => {
                let z = chol.solve_triangular(b, UPLO::Lower)?;
                Ok(chol.t().solve_triangular(&z, UPLO::Upper)?)
            }
            CorrFactorization::PseudoInverse { pinv, .. } => Ok(pinv.dot(b)),
        }
    }

    /// ln(det R): exact on the Cholesky path, clipped-spectrum estimate on
    /// the fallback path.
    pub fn log_det(&self) -> F {
        match self {
            CorrFactorization::Cholesky(chol) => {
                chol.diag().mapv(|v| v.ln()).sum() * F::cast(2.)
            }
            CorrFactorization::PseudoInverse { logdet, .. } => *logdet,
        }
    }

    /// Whether the fallback path was selected.
    pub fn is_least_squares(&self) -> bool {
        matches!(self, CorrFactorization::PseudoInverse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cholesky_path_solve() {
        let r = array![[4., 2.], [2., 3.]];
        let fac = CorrFactorization::compute(&r).unwrap();
        assert!(!fac.is_least_squares());
        let b = array![[2.], [5.]];
        let x = fac.solve(&b).unwrap();
        assert_abs_diff_eq!(r.dot(&x), b, epsilon = 1e-12);
        // det([[4, 2], [2, 3]]) = 8
        assert_abs_diff_eq!(fac.log_det(), 8.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_takes_fallback() {
        // Rank-1 matrix: Cholesky cannot hold, the pseudo-inverse must
        let r = array![[1., 1., 1.], [1., 1., 1.], [1., 1., 1.]];
        let fac = CorrFactorization::compute(&r).unwrap();
        assert!(fac.is_least_squares());
        let b = array![[1.], [1.], [1.]];
        let x = fac.solve(&b).unwrap();
        // Minimum-norm solution of ones * x = ones
        assert_abs_diff_eq!(r.dot(&x), b, epsilon = 1e-10);
    }

    #[test]
    fn test_near_singular_pivot_check_triggers_fallback() {
        let eps = 1e-14;
        let r = array![[1., 1. - eps], [1. - eps, 1.]];
        let fac = CorrFactorization::compute(&r).unwrap();
        assert!(fac.is_least_squares());
    }

    #[test]
    fn test_log_det_diagonal() {
        let r = array![[2., 0.], [0., 8.]];
        let fac = CorrFactorization::compute(&r).unwrap();
        assert_abs_diff_eq!(fac.log_det(), 16.0f64.ln(), epsilon = 1e-12);
    }
}
