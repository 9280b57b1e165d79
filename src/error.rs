// src/error.rs

use std::error::Error;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
/// Used at the linear-algebra backend seam.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Errors raised by the kernel PCA engine.
///
/// Only conditions that make a computation impossible are errors. Numerical
/// outcomes that depend on the data (a degenerate spectrum, a vanishing
/// pre-image denominator, an iteration that does not settle) are reported on
/// the returned values instead, because callers aggregate them over many runs.
#[derive(Error, Debug)]
pub enum KernelPcaError {
    #[error("Invalid parameter `{parameter}`: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("Dimension mismatch for {context}: expected {expected}, found {found}.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{context} contains non-finite (NaN or infinity) values.")]
    NonFiniteInput { context: &'static str },

    #[error("Symmetric eigendecomposition of the centered kernel matrix failed: {0}")]
    EigenDecomposition(String),

    #[error("Model I/O failed: {0}")]
    ModelIo(String),
}

impl KernelPcaError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        KernelPcaError::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelPcaError>;
