use thiserror::Error;

/// Main error type for the Proxima system
#[derive(Error, Debug)]
pub enum PxError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-merge errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Incompatible path: segment '{path}' holds a non-mapping value")]
    IncompatiblePath { path: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Model construction and initializer resolution errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Backend '{backend}' and its distributions are not registered")]
    UnknownBackend { backend: String },

    #[error("Invalid shape: {message}")]
    InvalidShape { message: String },

    #[error("Parameter group '{group}' reached graph construction without a resolved initializer")]
    UnresolvedInitializer { group: String },
}

/// Search orchestration errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Trial {trial} failed: {message}")]
    TrialFailed { trial: usize, message: String },

    #[error("Restore of trial {trial} failed: {message}")]
    RestoreFailed { trial: usize, message: String },

    #[error("No restorable model: all {attempted} candidates failed to restore")]
    NoRestorableModel { attempted: usize },
}

/// Estimator-adapter errors
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Params should be a mapping, got {found}")]
    InvalidParamsType { found: String },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error(
        "Degenerate sample size for AICc: n - k - 1 <= 0 (n = {samples}, k = {trainables})"
    )]
    DegenerateSampleSize { samples: usize, trainables: usize },

    #[error("Estimator is not fitted; call fit() first")]
    NotFitted,
}

/// Result type alias for Proxima operations
pub type PxResult<T> = Result<T, PxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ConfigError::PathNotFound {
            path: "guess_params.kernel_params".into(),
        };
        assert!(err.to_string().contains("guess_params.kernel_params"));

        let err = AdapterError::DegenerateSampleSize {
            samples: 4,
            trainables: 5,
        };
        assert!(err.to_string().contains("n = 4"));
    }

    #[test]
    fn error_conversion() {
        let model_err = ModelError::UnknownBackend {
            backend: "mxnet".into(),
        };
        let px_err: PxError = model_err.into();
        match px_err {
            PxError::Model(_) => (),
            _ => panic!("Expected Model error"),
        }
    }
}
