use crate::algorithm::{COBYLA_MAX_EVAL, COBYLA_MIN_EVAL, OPTIM_N_START};
use crate::correlation_models::{CorrelationModel, SquaredExponentialCorr};
use crate::errors::{KrigingError, Result};
use linfa::Float;
use ndarray::{array, Array1};

/// Tuning policy for the correlation length-scales of one surrogate.
#[derive(Clone, Debug, PartialEq)]
pub enum ThetaTuning<F: Float> {
    /// Use the given value as-is, skipping the likelihood search
    Fixed(Array1<F>),
    /// Maximize the concentrated likelihood within `bounds`, starting the
    /// search from `init`
    Optimized {
        /// Initial guess for theta
        init: Array1<F>,
        /// Per-component (lower, upper) search bounds
        bounds: Array1<(F, F)>,
    },
}

impl<F: Float> Default for ThetaTuning<F> {
    fn default() -> Self {
        ThetaTuning::Optimized {
            init: array![F::cast(ThetaTuning::<F>::DEFAULT_INIT)],
            bounds: array![(
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.0),
                F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.1),
            )],
        }
    }
}

impl<F: Float> ThetaTuning<F> {
    /// Default initial theta value
    pub const DEFAULT_INIT: f64 = 1e-1;
    /// Default search bounds for theta values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-6, 2e1);

    /// Initial (or fixed) theta value
    pub fn init(&self) -> &Array1<F> {
        match self {
            ThetaTuning::Fixed(init) => init,
            ThetaTuning::Optimized { init, .. } => init,
        }
    }

    /// Initial theta broadcast to `dim` components.
    /// A length-1 value is repeated; any other length must match `dim`.
    pub(crate) fn init_for(&self, dim: usize) -> Result<Array1<F>> {
        let init = self.init();
        if init.iter().any(|v| *v <= F::zero()) {
            return Err(KrigingError::InvalidValue(
                "theta values must be strictly positive".to_string(),
            ));
        }
        match init.len() {
            1 => Ok(Array1::from_elem(dim, init[0])),
            n if n == dim => Ok(init.to_owned()),
            n => Err(KrigingError::InvalidValue(format!(
                "initial theta should have 1 or {dim} components, got {n}"
            ))),
        }
    }

    /// Search bounds broadcast to `dim` components; `None` for fixed theta.
    pub(crate) fn bounds_for(&self, dim: usize) -> Result<Option<Vec<(F, F)>>> {
        let bounds = match self {
            ThetaTuning::Fixed(_) => return Ok(None),
            ThetaTuning::Optimized { bounds, .. } => bounds,
        };
        if bounds.iter().any(|(lo, up)| *lo <= F::zero() || lo >= up) {
            return Err(KrigingError::InvalidValue(
                "theta bounds must be strictly positive with lower < upper".to_string(),
            ));
        }
        match bounds.len() {
            1 => Ok(Some(vec![bounds[0]; dim])),
            n if n == dim => Ok(Some(bounds.to_vec())),
            n => Err(KrigingError::InvalidValue(format!(
                "theta bounds should have 1 or {dim} components, got {n}"
            ))),
        }
    }
}

/// The set of parameters configuring the training of a
/// [`KrigingSurrogate`](crate::KrigingSurrogate).
#[derive(Clone, Debug)]
pub struct KrigingParams<F: Float, Corr: CorrelationModel<F> = SquaredExponentialCorr> {
    pub(crate) corr: Corr,
    pub(crate) theta_tuning: ThetaTuning<F>,
    pub(crate) n_start: usize,
    pub(crate) max_eval: usize,
    pub(crate) nugget: F,
    pub(crate) seed: u64,
}

impl<F: Float, Corr: CorrelationModel<F>> Default for KrigingParams<F, Corr> {
    fn default() -> Self {
        KrigingParams {
            corr: Corr::default(),
            theta_tuning: ThetaTuning::default(),
            n_start: OPTIM_N_START,
            max_eval: COBYLA_MAX_EVAL,
            nugget: F::cast(100.0) * F::epsilon(),
            seed: 42,
        }
    }
}

impl<F: Float, Corr: CorrelationModel<F>> KrigingParams<F, Corr> {
    /// Set the correlation model.
    pub fn corr(mut self, corr: Corr) -> Self {
        self.corr = corr;
        self
    }

    /// Set the theta tuning policy.
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.theta_tuning = theta_tuning;
        self
    }

    /// Set the starting value for the theta search, keeping the current
    /// bounds. For fixed tuning this sets the constant value.
    pub fn theta_init(mut self, theta_init: Array1<F>) -> Self {
        self.theta_tuning = match self.theta_tuning {
            ThetaTuning::Fixed(_) => ThetaTuning::Fixed(theta_init),
            ThetaTuning::Optimized { init: _, bounds } => ThetaTuning::Optimized {
                init: theta_init,
                bounds,
            },
        };
        self
    }

    /// Set the theta search bounds. No-op for fixed tuning.
    pub fn theta_bounds(mut self, theta_bounds: Array1<(F, F)>) -> Self {
        self.theta_tuning = match self.theta_tuning {
            ThetaTuning::Fixed(f) => ThetaTuning::Fixed(f),
            ThetaTuning::Optimized { init, bounds: _ } => ThetaTuning::Optimized {
                init,
                bounds: theta_bounds,
            },
        };
        self
    }

    /// Set the number of randomized restarts of the likelihood search.
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.n_start = n_start;
        self
    }

    /// Set the maximum number of likelihood evaluations per restart,
    /// floored at [`COBYLA_MIN_EVAL`].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.max_eval = COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the diagonal regularization added to the correlation matrix.
    pub fn nugget(mut self, nugget: F) -> Self {
        self.nugget = nugget;
        self
    }

    /// Set the seed of the randomized multistart draw, making the
    /// hyperparameter search reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_defaults() {
        let params = KrigingParams::<f64>::default();
        assert_eq!(params.n_start, OPTIM_N_START);
        assert_eq!(params.max_eval, COBYLA_MAX_EVAL);
        assert_eq!(params.seed, 42);
        assert_eq!(
            params.theta_tuning.init(),
            &array![ThetaTuning::<f64>::DEFAULT_INIT]
        );
    }

    #[test]
    fn test_init_broadcast() {
        let tuning = ThetaTuning::<f64>::default();
        assert_eq!(tuning.init_for(3).unwrap(), array![0.1, 0.1, 0.1]);
        let tuning = ThetaTuning::Fixed(array![0.5, 0.7]);
        assert!(tuning.init_for(3).is_err());
        assert_eq!(tuning.init_for(2).unwrap(), array![0.5, 0.7]);
    }

    #[test]
    fn test_invalid_theta_rejected() {
        let tuning = ThetaTuning::Fixed(array![0.0]);
        assert!(tuning.init_for(1).is_err());
        let tuning = ThetaTuning::Optimized {
            init: array![0.1],
            bounds: array![(1.0, 0.5)],
        };
        assert!(tuning.bounds_for(1).is_err());
    }

    #[test]
    fn test_max_eval_floor() {
        let params = KrigingParams::<f64>::default().max_eval(1);
        assert_eq!(params.max_eval, COBYLA_MIN_EVAL);
    }
}
