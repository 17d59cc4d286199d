//! Structured error types for the Velella ecosystem.

use thiserror::Error;

/// Unified error type for all Velella operations.
#[derive(Debug, Error)]
pub enum VelellaError {
    /// Structural invariant violated at construction or fitting time
    /// (wrong length, negative probability, probabilities not summing to 1,
    /// non-positive standard deviation, empty state space).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Runtime query at a value outside a distribution's declared support.
    #[error("out of domain: {0}")]
    OutOfDomain(String),

    /// A model became degenerate (zero posterior mass), leaving an operation
    /// with nothing to estimate from.
    #[error("degenerate model: {0}")]
    Degenerate(String),
}

/// Convenience alias used throughout the Velella ecosystem.
pub type Result<T> = std::result::Result<T, VelellaError>;
