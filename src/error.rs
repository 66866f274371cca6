//! Error types for the ambient-contrib library.

use thiserror::Error;

/// Main error type for the library.
///
/// Conditions that affect only a subset of the output (an undefined scaling
/// factor for one sample, for example) are reported as missing values
/// (`f64::NAN`) in the result matrix rather than through this type, so that
/// one degenerate sample does not abort estimation for all others.
#[derive(Error, Debug)]
pub enum AmbientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Gene axis mismatch: {0}")]
    GeneMismatch(String),

    #[error("Invalid control gene set: {0}")]
    InvalidControlSet(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, AmbientError>;
