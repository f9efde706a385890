use thiserror::Error;

/// A result type for kriging surrogate operations
pub type Result<T> = std::result::Result<T, KrigingError>;

/// An error raised when training or querying a [`KrigingSurrogate`](crate::KrigingSurrogate)
#[derive(Error, Debug)]
pub enum KrigingError {
    /// When `train` is given fewer samples than a surrogate can be fitted to
    #[error("Kriging surrogate requires at least 2 training points.")]
    InsufficientData,
    /// When `predict` or `jacobian` is called before a successful `train`
    #[error("Kriging surrogate has not been trained, so no prediction can be made.")]
    NotTrained,
    /// When input dimensions disagree with each other or with the trained model
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// When a likelihood evaluation cannot be completed for a candidate theta
    #[error("Likelihood computation error: {0}")]
    LikelihoodComputation(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    Linalg(#[from] linfa_linalg::LinalgError),
    /// When a parameter value is invalid
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
