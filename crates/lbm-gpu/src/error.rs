//! Error types for the lattice solver.

use thiserror::Error;

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, LbmError>;

/// Errors that can occur while configuring or running the solver.
#[derive(Error, Debug)]
pub enum LbmError {
    /// Invalid flow or dispatch configuration (zero extents, obstacle outside the domain, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An array does not have the extents the lattice was configured with.
    #[error("Shape mismatch for {field}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Name of the offending field.
        field: &'static str,
        /// Expected extents.
        expected: Vec<usize>,
        /// Actual extents.
        actual: Vec<usize>,
    },

    /// Device, compilation or launch failure in a GPU backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Malformed or inconsistent kernel fixture.
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// Density or velocity became NaN or infinite.
    #[error("Numerical instability: non-finite density or velocity at iteration {iteration}")]
    NonFinite {
        /// Iteration of the offending snapshot.
        iteration: usize,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parameter file could not be parsed.
    #[error("Parameter file error: {0}")]
    ParamsParse(#[from] toml::de::Error),
}

impl LbmError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a fixture error.
    pub fn fixture(msg: impl Into<String>) -> Self {
        Self::Fixture(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(field: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            field,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
