//! Error types for the solvers.
//!
//! Numeric failures (NaN residual, iteration budget exhausted) are not errors;
//! they come back as a [`SolveStatus`](crate::SolveStatus) inside the outcome.

use thiserror::Error;

/// Errors that abort a solve.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure in the data model or in communication.
    #[error(transparent)]
    Core(#[from] hpgmp_core::Error),

    /// Solver configuration is outside its valid range.
    #[error("Invalid solver parameter: {0}")]
    InvalidParameter(String),

    /// Operand sizes do not fit the operator.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, Error>;
