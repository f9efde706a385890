//! Multistart COBYLA search used for likelihood maximization over log10(theta).

use linfa::prelude::Float;
use ndarray::{s, Array1, Array2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Build the starting points for the likelihood search on the log10 scale:
/// the user/default init first, then `n_start` points drawn uniformly within
/// the log10 bounds from a generator seeded with `seed`.
/// Returns the (n_start + 1, dim) starting points and the log10 bounds.
pub(crate) fn prepare_multistart<F: Float>(
    n_start: usize,
    theta0: &Array1<F>,
    bounds: &[(F, F)],
    seed: u64,
) -> (Array2<F>, Vec<(F, F)>) {
    let bounds: Vec<(F, F)> = bounds
        .iter()
        .map(|(lo, up)| (lo.log10(), up.log10()))
        .collect();

    let mut theta0s = Array2::zeros((n_start + 1, theta0.len()));
    theta0s.row_mut(0).assign(&theta0.mapv(|v| v.log10()));

    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    for mut row in theta0s.slice_mut(s![1.., ..]).rows_mut() {
        for (j, (lo, up)) in bounds.iter().enumerate() {
            row[j] = F::cast(rng.gen_range(into_f64(lo)..into_f64(up)));
        }
    }
    (theta0s, bounds)
}

/// Minimize `objfn` within `bounds` starting from `param0` with COBYLA.
/// Returns the best objective value (INFINITY when the run failed or produced
/// NaN) together with the parameters it was reached at.
pub(crate) fn optimize_params<ObjF, F>(
    objfn: ObjF,
    param0: &Array1<F>,
    bounds: &[(F, F)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
    F: Float,
{
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0: Vec<f64> = param0.iter().map(into_f64).collect();
    let bounds: Vec<(f64, f64)> = bounds
        .iter()
        .map(|(lo, up)| (into_f64(lo), into_f64(up)))
        .collect();

    match minimize(
        |x, u| objfn(x, None, u),
        &param0,
        &bounds,
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, Array1::from_vec(x_opt))
        }
        Err((status, x_opt, _)) => {
            log::warn!("COBYLA failed during hyperparameter search: {status:?}");
            (f64::INFINITY, Array1::from_vec(x_opt))
        }
    }
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: &F) -> f64 {
    num_traits::ToPrimitive::to_f64(v).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_multistart_layout_and_determinism() {
        let theta0 = array![0.1, 0.1];
        let bounds = [(1e-6, 20.), (1e-6, 20.)];
        let (starts_a, log_bounds) = prepare_multistart(5, &theta0, &bounds, 42);
        let (starts_b, _) = prepare_multistart(5, &theta0, &bounds, 42);
        assert_eq!(starts_a.dim(), (6, 2));
        assert_abs_diff_eq!(starts_a, starts_b);
        assert_abs_diff_eq!(starts_a.row(0)[0], 0.1f64.log10(), epsilon = 1e-12);
        for row in starts_a.rows() {
            for (v, (lo, up)) in row.iter().zip(&log_bounds) {
                assert!(*v >= *lo && *v <= *up);
            }
        }
    }

    #[test]
    fn test_different_seed_different_starts() {
        let theta0 = array![0.1];
        let bounds = [(1e-6, 20.)];
        let (starts_a, _) = prepare_multistart(3, &theta0, &bounds, 1);
        let (starts_b, _) = prepare_multistart(3, &theta0, &bounds, 2);
        assert!(starts_a != starts_b);
    }

    #[test]
    fn test_cobyla_minimizes_quadratic() {
        let objfn = |x: &[f64], _g: Option<&mut [f64]>, _u: &mut ()| (x[0] - 0.3).powi(2);
        let (fval, x_opt) = optimize_params(
            objfn,
            &array![-1.0f64],
            &[(-2., 2.)],
            CobylaParams::default(),
        );
        assert!(fval < 1e-4);
        assert_abs_diff_eq!(x_opt[0], 0.3, epsilon = 0.05);
    }
}
