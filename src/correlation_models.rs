//! Spatial correlation kernels used to model the error term of the
//! kriging surrogate.
//!
//! Ordinary kriging uses the squared exponential (Gaussian) kernel; the
//! [`CorrelationModel`] trait is the seam other kernels would plug into.

use crate::utils::differences;
use linfa::Float;
use ndarray::{Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use std::fmt;

/// A trait for the spatial correlation between two normalized input points.
pub trait CorrelationModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute correlation values for componentwise distances `d` (n, nx),
    /// one row per point pair, given length-scales `theta` (nx,).
    /// Returns an (n, 1) column of values in (0, 1].
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;

    /// Compute partial derivatives of the correlation between `x` and every
    /// row of `xtrain` with respect to the components of `x`, as an (n, nx)
    /// matrix.
    fn jacobian(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;
}

/// Squared exponential (Gaussian) correlation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SquaredExponentialCorr();

impl<F: Float> CorrelationModel<F> for SquaredExponentialCorr {
    /// r(d) = exp( - sum_k theta_k * d_k^2 )
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let r = d.mapv(|v| v * v).dot(theta);
        r.mapv(|v| F::exp(-v)).insert_axis(Axis(1))
    }

    /// dr/dx_k = -2 * theta_k * (x_k - xtrain_k) * r
    fn jacobian(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let d = differences(x, xtrain);
        let r = self.value(&d, theta);
        let dtheta = theta.mapv(|v| F::cast(-2.) * v);
        d * &dtheta * &r
    }
}

impl fmt::Display for SquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_value_at_zero_distance_is_one() {
        let corr = SquaredExponentialCorr::default();
        let d = array![[0., 0.]];
        let r = corr.value(&d, &array![0.3, 7.]);
        assert_abs_diff_eq!(r[[0, 0]], 1.);
    }

    #[test]
    fn test_value() {
        let corr = SquaredExponentialCorr::default();
        let d = array![[0.5], [2.]];
        let r = corr.value(&d, &array![2.]);
        assert_abs_diff_eq!(r[[0, 0]], (-0.5f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(r[[1, 0]], (-8.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_value_symmetric_in_sign() {
        let corr = SquaredExponentialCorr::default();
        let theta = array![0.7, 1.3];
        let plus = corr.value(&array![[0.2, -0.4]], &theta);
        let minus = corr.value(&array![[-0.2, 0.4]], &theta);
        assert_abs_diff_eq!(plus[[0, 0]], minus[[0, 0]], epsilon = 1e-15);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let corr = SquaredExponentialCorr::default();
        let theta = array![0.8, 2.5];
        let xtrain = array![[0.1, -0.3], [1.0, 0.7]];
        let x = array![0.4, 0.2];
        let jac = corr.jacobian(&x, &xtrain, &theta);

        let eps = 1e-7;
        for k in 0..2 {
            let mut xp = x.clone();
            xp[k] += eps;
            let mut xm = x.clone();
            xm[k] -= eps;
            let rp = corr.value(&differences(&xp, &xtrain), &theta);
            let rm = corr.value(&differences(&xm, &xtrain), &theta);
            for i in 0..2 {
                let fdiff = (rp[[i, 0]] - rm[[i, 0]]) / (2. * eps);
                assert_abs_diff_eq!(jac[[i, k]], fdiff, epsilon = 1e-6);
            }
        }
    }
}
