//! This library implements an ordinary [Kriging](https://en.wikipedia.org/wiki/Kriging)
//! (Gaussian-process) surrogate model for expensive deterministic functions:
//! trained on scattered input/output samples, it reproduces the training
//! outputs exactly, predicts a mean and a variance estimate at unseen points,
//! and provides the analytic gradient of the predicted mean.
//!
//! The model is implemented by [`KrigingSurrogate`], configured through
//! [`KrigingParams`]. Correlation length-scales are fitted per output column
//! by maximum likelihood (seeded multistart COBYLA search); the correlation
//! matrix is factorized by Cholesky decomposition with a silent least-squares
//! fallback, so training keeps working on ill-conditioned sample layouts.
//!
//! ```no_run
//! use kriging_surrogate::KrigingSurrogate;
//! use ndarray::{arr1, arr2};
//!
//! let xt = arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0]]);
//! let yt = arr2(&[[0.0], [0.84], [0.91], [0.14], [-0.76]]);
//!
//! let mut surrogate = KrigingSurrogate::<f64>::default();
//! surrogate.train(&xt, &yt).expect("training");
//!
//! let (mean, variance) = surrogate.predict(&arr1(&[2.5])).expect("prediction");
//! let gradient = surrogate.jacobian(&arr1(&[2.5])).expect("gradient");
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod correlation_models;
mod errors;
mod linalg;
mod optimization;
mod parameters;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use parameters::*;
