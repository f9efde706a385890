use crate::correlation_models::{CorrelationModel, SquaredExponentialCorr};
use crate::errors::{KrigingError, Result};
use crate::linalg::CorrFactorization;
use crate::optimization::{into_f64, optimize_params, prepare_multistart, CobylaParams};
use crate::parameters::KrigingParams;
use crate::utils::{differences, DiffMatrix, NormalizedData};

use linfa::Float;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_stats::QuantileExt;
use std::fmt;

/// Default number of randomized restarts of the hyperparameter search
pub const OPTIM_N_START: usize = 10;
/// Minimum number of likelihood evaluations per COBYLA run
pub const COBYLA_MIN_EVAL: usize = 25;
/// Maximum number of likelihood evaluations per COBYLA run
pub const COBYLA_MAX_EVAL: usize = 1000;

/// Floor applied to the process variance inside the log-likelihood so a
/// perfectly interpolated output cannot produce an unbounded value.
const SIGMA2_FLOOR: f64 = 1e-25;

/// Per-output quantities computed during training and reused by every
/// subsequent prediction.
#[derive(Debug, Clone)]
struct OutputFit<F: Float> {
    /// Correlation length-scales for this output
    theta: Array1<F>,
    /// Concentrated log-likelihood reached at `theta`
    likelihood: F,
    /// Constant regression mean (normalized units)
    beta: F,
    /// Process variance (original output units)
    sigma2: F,
    /// Solve vector R^-1 (y - 1 beta), shape (n, 1)
    gamma: Array2<F>,
    /// Factorization of the correlation matrix R
    fac: CorrFactorization<F>,
    /// 1^t R^-1 1, reused by the prediction variance
    one_rinv_one: F,
}

#[derive(Debug, Clone)]
struct FittedState<F: Float> {
    /// Normalized training inputs
    xt: NormalizedData<F>,
    /// Normalized training outputs
    yt: NormalizedData<F>,
    /// Independent fitted state per output column
    outputs: Vec<OutputFit<F>>,
}

/// Artifacts of one likelihood evaluation, reusable for prediction once the
/// winning theta is known.
struct InnerParams<F: Float> {
    beta: F,
    /// Process variance in normalized output units
    sigma2: F,
    gamma: Array2<F>,
    fac: CorrFactorization<F>,
    one_rinv_one: F,
}

/// An ordinary-kriging (Gaussian process) surrogate model.
///
/// The surrogate interpolates a deterministic function sampled at n training
/// points: the predicted mean reproduces the training outputs exactly, and a
/// variance estimate quantifies the uncertainty away from them. The modeled
/// output is
///
/// `Y(x) = beta + Z(x)`
///
/// where `beta` is a constant regression mean and `Z(x)` a zero-mean Gaussian
/// process with variance `sigma^2` and correlation `corr(x, x')` governed by
/// per-dimension length-scales `theta`, fitted by maximizing the concentrated
/// log-likelihood of the training data. Each output column owns its own
/// `theta`, factorization and regression statistics, so vector outputs are
/// o independent fits sharing the normalized inputs.
///
/// The model starts untrained: [`predict`](KrigingSurrogate::predict) and
/// [`jacobian`](KrigingSurrogate::jacobian) fail until
/// [`train`](KrigingSurrogate::train) succeeds, and a new `train` call
/// atomically replaces the whole fitted state.
///
/// # Example
///
/// ```no_run
/// use kriging_surrogate::KrigingSurrogate;
/// use ndarray::{arr1, arr2};
///
/// let xt = arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0]]);
/// let yt = arr2(&[[0.0], [0.84], [0.91], [0.14], [-0.76]]);
///
/// let mut surrogate = KrigingSurrogate::<f64>::default();
/// surrogate.train(&xt, &yt).expect("training");
///
/// let (mean, variance) = surrogate.predict(&arr1(&[2.5])).expect("prediction");
/// let gradient = surrogate.jacobian(&arr1(&[2.5])).expect("gradient");
/// ```
#[derive(Debug, Clone)]
pub struct KrigingSurrogate<F: Float = f64, Corr: CorrelationModel<F> = SquaredExponentialCorr> {
    params: KrigingParams<F, Corr>,
    fitted: Option<FittedState<F>>,
}

impl<F: Float, Corr: CorrelationModel<F>> Default for KrigingSurrogate<F, Corr> {
    fn default() -> Self {
        Self::new(KrigingParams::default())
    }
}

impl<F: Float> KrigingSurrogate<F> {
    /// Parameters constructor for the default ordinary-kriging configuration
    /// (squared exponential correlation).
    pub fn params() -> KrigingParams<F> {
        KrigingParams::default()
    }
}

impl<F: Float, Corr: CorrelationModel<F>> KrigingSurrogate<F, Corr> {
    /// An untrained surrogate configured with the given parameters.
    pub fn new(params: KrigingParams<F, Corr>) -> Self {
        KrigingSurrogate {
            params,
            fitted: None,
        }
    }

    /// Whether a successful `train` call has installed fitted state.
    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Input and output dimensions of the trained model, if any.
    pub fn dims(&self) -> Option<(usize, usize)> {
        self.fitted
            .as_ref()
            .map(|f| (f.xt.ncols(), f.outputs.len()))
    }

    /// Fitted correlation length-scales of one output column.
    pub fn theta(&self, output: usize) -> Result<&Array1<F>> {
        let fitted = self.fitted.as_ref().ok_or(KrigingError::NotTrained)?;
        fitted
            .outputs
            .get(output)
            .map(|o| &o.theta)
            .ok_or_else(|| {
                KrigingError::InvalidValue(format!(
                    "output index {output} out of range for {} outputs",
                    fitted.outputs.len()
                ))
            })
    }

    /// Concentrated log-likelihood reached for one output column.
    pub fn likelihood(&self, output: usize) -> Result<F> {
        let fitted = self.fitted.as_ref().ok_or(KrigingError::NotTrained)?;
        fitted
            .outputs
            .get(output)
            .map(|o| o.likelihood)
            .ok_or_else(|| {
                KrigingError::InvalidValue(format!(
                    "output index {output} out of range for {} outputs",
                    fitted.outputs.len()
                ))
            })
    }

    /// Fit the surrogate to training inputs `x` (n, d) and outputs `y` (n, o).
    ///
    /// Normalizes both sides, then fits each output column independently:
    /// the hyperparameter search maximizes the concentrated log-likelihood
    /// and the winning factorization is kept for predictions. Any previous
    /// fitted state is replaced atomically once every output has been fitted.
    ///
    /// Fails with [`KrigingError::InsufficientData`] when n < 2.
    pub fn train(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<()> {
        if x.nrows() < 2 {
            return Err(KrigingError::InsufficientData);
        }
        if x.nrows() != y.nrows() {
            return Err(KrigingError::ShapeMismatch(format!(
                "{} input rows vs {} output rows",
                x.nrows(),
                y.nrows()
            )));
        }
        if x.ncols() == 0 || y.ncols() == 0 {
            return Err(KrigingError::InvalidValue(
                "training inputs and outputs need at least one column".to_string(),
            ));
        }
        if self.params.nugget < F::zero() {
            return Err(KrigingError::InvalidValue(
                "nugget must be non-negative".to_string(),
            ));
        }

        let dim = x.ncols();
        let theta0 = self.params.theta_tuning.init_for(dim)?;
        let bounds = self.params.theta_tuning.bounds_for(dim)?;

        let xt = NormalizedData::new(x);
        let yt = NormalizedData::new(y);
        let x_distances = DiffMatrix::new(&xt.data);

        let row_gaps = x_distances
            .d
            .mapv(|v| num_traits::float::Float::abs(v))
            .sum_axis(Axis(1));
        if let Ok(min_gap) = row_gaps.min() {
            if *min_gap == F::zero() {
                warn!(
                    "two or more training points are identical, \
                     the correlation matrix will be singular"
                );
            }
        }

        let corr = self.params.corr;
        let nugget = self.params.nugget;

        let mut outputs = Vec::with_capacity(y.ncols());
        for j in 0..y.ncols() {
            let y_col = yt.data.column(j).to_owned().insert_axis(Axis(1));

            let opt_theta = match &bounds {
                None => theta0.to_owned(),
                Some(bounds) => {
                    let objfn = |p: &[f64], _gradient: Option<&mut [f64]>, _u: &mut ()| -> f64 {
                        let theta: Array1<F> =
                            p.iter().map(|v| F::cast(10f64.powf(*v))).collect();
                        if theta.iter().any(|v| !v.is_finite()) {
                            return f64::INFINITY;
                        }
                        match reduced_likelihood(&corr, &x_distances, &y_col, &theta, nugget) {
                            Ok((lkh, _)) => -into_f64(&lkh),
                            Err(_) => f64::INFINITY,
                        }
                    };

                    let (theta_inits, log_bounds) = prepare_multistart(
                        self.params.n_start,
                        &theta0,
                        bounds,
                        self.params.seed,
                    );
                    let maxeval = (10 * dim).clamp(COBYLA_MIN_EVAL, self.params.max_eval);
                    let mut best: (f64, Array1<f64>) =
                        (f64::INFINITY, theta0.mapv(|v| into_f64(&v).log10()));
                    for i in 0..theta_inits.nrows() {
                        let candidate = optimize_params(
                            &objfn,
                            &theta_inits.row(i).to_owned(),
                            &log_bounds,
                            CobylaParams {
                                maxeval,
                                ..CobylaParams::default()
                            },
                        );
                        if candidate.0 < best.0 {
                            best = candidate;
                        }
                    }
                    best.1.mapv(|v| F::cast(10f64.powf(v)))
                }
            };

            let (likelihood, inner) =
                reduced_likelihood(&corr, &x_distances, &y_col, &opt_theta, nugget)?;
            debug!(
                "output {j}: theta={opt_theta}, likelihood={likelihood}, least_squares={}",
                inner.fac.is_least_squares()
            );
            outputs.push(OutputFit {
                theta: opt_theta,
                likelihood,
                beta: inner.beta,
                sigma2: inner.sigma2 * yt.std[j] * yt.std[j],
                gamma: inner.gamma,
                fac: inner.fac,
                one_rinv_one: inner.one_rinv_one,
            });
        }

        self.fitted = Some(FittedState { xt, yt, outputs });
        Ok(())
    }

    /// Predicted mean and variance at a query point `x` of d components.
    ///
    /// Both are returned in original output units as length-o vectors aligned
    /// with the training output columns (length 1 for single-output models).
    /// The variance is clipped at zero against floating-point cancellation.
    ///
    /// Fails with [`KrigingError::NotTrained`] before a successful `train`.
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let fitted = self.fitted.as_ref().ok_or(KrigingError::NotTrained)?;
        let xnorm = self.normalize_query(fitted, x)?;
        let d = differences(&xnorm, &fitted.xt.data);

        let mut mean = Array1::zeros(fitted.outputs.len());
        let mut variance = Array1::zeros(fitted.outputs.len());
        for (j, fit) in fitted.outputs.iter().enumerate() {
            let r = self.params.corr.value(&d, &fit.theta);
            let mu = fit.beta + r.t().dot(&fit.gamma)[[0, 0]];
            mean[j] = mu * fitted.yt.std[j] + fitted.yt.mean[j];

            let rinv_r = fit.fac.solve(&r)?;
            let r_rinv_r = (&r * &rinv_r).sum();
            let excess = F::one() - rinv_r.sum();
            let mse = fit.sigma2
                * (F::one() - r_rinv_r + excess * excess / fit.one_rinv_one);
            variance[j] = if mse < F::zero() { F::zero() } else { mse };
        }
        Ok((mean, variance))
    }

    /// Gradient of the predicted mean at a query point `x`, as an (o, d)
    /// matrix in original units (chain rule through both normalizations).
    ///
    /// Fails with [`KrigingError::NotTrained`] before a successful `train`.
    pub fn jacobian(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array2<F>> {
        let fitted = self.fitted.as_ref().ok_or(KrigingError::NotTrained)?;
        let xnorm = self.normalize_query(fitted, x)?;

        let dim = fitted.xt.ncols();
        let mut jac = Array2::zeros((fitted.outputs.len(), dim));
        for (j, fit) in fitted.outputs.iter().enumerate() {
            let dr = self
                .params
                .corr
                .jacobian(&xnorm, &fitted.xt.data, &fit.theta);
            let dmu = dr.t().dot(&fit.gamma);
            for k in 0..dim {
                jac[[j, k]] = dmu[[k, 0]] * fitted.yt.std[j] / fitted.xt.std[k];
            }
        }
        Ok(jac)
    }

    fn normalize_query(
        &self,
        fitted: &FittedState<F>,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Array1<F>> {
        if x.len() != fitted.xt.ncols() {
            return Err(KrigingError::ShapeMismatch(format!(
                "query point has {} components, model was trained on {}",
                x.len(),
                fitted.xt.ncols()
            )));
        }
        Ok((x.to_owned() - &fitted.xt.mean) / &fitted.xt.std)
    }
}

impl<F: Float, Corr: CorrelationModel<F>> fmt::Display for KrigingSurrogate<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.dims() {
            Some((nx, ny)) => write!(
                f,
                "KrigingSurrogate(corr={}, inputs={nx}, outputs={ny})",
                self.params.corr
            ),
            None => write!(f, "KrigingSurrogate(corr={}, untrained)", self.params.corr),
        }
    }
}

/// Evaluate the concentrated log-likelihood of one normalized output column
/// for a candidate `theta`.
///
/// Builds the correlation matrix R over all training pairs (diagonal
/// regularized by `nugget`), factorizes it through the two-path backend, and
/// profiles out the constant mean `beta` and process variance `sigma2`:
///
/// `lkh = -(n/2) ln(sigma2) - (1/2) ln(det R)`
///
/// On the least-squares path the variance folds in the residual of the solve
/// itself, so rank-deficient fits that only look exact under the truncated
/// pseudo-inverse are not scored as exact. The solve artifacts are returned
/// for reuse once the winning theta is known.
fn reduced_likelihood<F: Float, Corr: CorrelationModel<F>>(
    corr: &Corr,
    x_distances: &DiffMatrix<F>,
    ytrain: &Array2<F>,
    theta: &Array1<F>,
    nugget: F,
) -> Result<(F, InnerParams<F>)> {
    let rxx = corr.value(&x_distances.d, theta);
    let n = x_distances.n_obs;
    let mut r_mx: Array2<F> = Array2::<F>::eye(n).mapv(|v| v + v * nugget);
    for (i, ij) in x_distances.d_indices.outer_iter().enumerate() {
        r_mx[[ij[0], ij[1]]] = rxx[[i, 0]];
        r_mx[[ij[1], ij[0]]] = rxx[[i, 0]];
    }

    let fac = CorrFactorization::compute(&r_mx)?;
    let ones = Array2::<F>::ones((n, 1));
    let rinv_y = fac.solve(ytrain)?;
    let rinv_one = fac.solve(&ones)?;
    let one_rinv_one = rinv_one.sum();
    if one_rinv_one <= F::zero() || !one_rinv_one.is_finite() {
        return Err(KrigingError::LikelihoodComputation(
            "constant regression term is not identifiable".to_string(),
        ));
    }

    let beta = rinv_y.sum() / one_rinv_one;
    let rho = ytrain.mapv(|v| v - beta);
    let gamma = &rinv_y - &rinv_one.mapv(|v| v * beta);
    // Residual of the solve itself: zero on the Cholesky path, the truncated
    // component on the least-squares path
    let lack_of_fit = (&rho - &r_mx.dot(&gamma)).mapv(|v| v * v).sum();

    let n_obs = F::cast(n);
    let mut sigma2 = ((&rho * &gamma).sum() + lack_of_fit) / n_obs;
    if sigma2 < F::zero() {
        sigma2 = F::zero();
    }
    if !sigma2.is_finite() {
        return Err(KrigingError::LikelihoodComputation(
            "process variance is not finite".to_string(),
        ));
    }

    let likelihood = -n_obs / F::cast(2.) * sigma2.max(F::cast(SIGMA2_FLOOR)).ln()
        - fac.log_det() / F::cast(2.);

    Ok((
        likelihood,
        InnerParams {
            beta,
            sigma2,
            gamma,
            fac,
            one_rinv_one,
        },
    ))
}
