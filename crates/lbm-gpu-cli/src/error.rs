//! Error types for the lbm-gpu CLI.

use thiserror::Error;

/// CLI result type alias.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the solver.
    #[error(transparent)]
    Solver(#[from] lbm_gpu::LbmError),

    /// JSON output could not be produced.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Parameters could not be rendered as TOML.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Verification or fixture replay exceeded the tolerance.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Feature not available.
    #[error("Feature not available: {0}. Enable with --features {1}")]
    FeatureNotAvailable(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_error_is_transparent() {
        let err: CliError = lbm_gpu::LbmError::config("nx must be positive").into();
        assert_eq!(err.to_string(), "Configuration error: nx must be positive");
    }

    #[test]
    fn test_feature_message() {
        let err = CliError::FeatureNotAvailable("CUDA backend".into(), "cuda".into());
        assert_eq!(
            err.to_string(),
            "Feature not available: CUDA backend. Enable with --features cuda"
        );
    }
}
