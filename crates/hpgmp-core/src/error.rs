//! Error types for the HPGMP data model.

use thiserror::Error;

/// Errors raised while building or communicating distributed objects.
#[derive(Debug, Error)]
pub enum Error {
    /// Two objects that must agree in size do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The requested process grid or local box is unusable.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A message was lost, a peer hung up, or shared state was poisoned.
    ///
    /// Lock-step collective code has no recovery from this, so callers treat it
    /// as fatal to the whole run.
    #[error("Communication failure: {0}")]
    Communication(String),

    /// A parameter is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for data-model operations.
pub type Result<T> = std::result::Result<T, Error>;
