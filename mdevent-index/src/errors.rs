//! Error and result types for index construction and queries.
//!
//! Every failure in this crate is a programmer error detected at the call
//! that received the bad input. Nothing is retried or silently repaired:
//!
//! - [`IndexError::Argument`]: a malformed argument, such as a flat event
//!   buffer whose length is not a multiple of `ND + 2`, or a dimension/width
//!   combination the interleaver cannot represent.
//! - [`IndexError::PreconditionViolation`]: the input breaks a documented
//!   precondition, such as unsorted events, inverted key bounds or a
//!   coordinate outside the space bounds.

use thiserror::Error;

/// Errors that can occur while building or querying a Morton index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl IndexError {
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        IndexError::Argument(message.into())
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        let message = message.into();
        log::warn!("Rejected index input: {}", message);
        IndexError::PreconditionViolation(message)
    }

    /// Returns true for [`IndexError::Argument`].
    pub fn is_argument(&self) -> bool {
        matches!(self, IndexError::Argument(_))
    }

    /// Returns true for [`IndexError::PreconditionViolation`].
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, IndexError::PreconditionViolation(_))
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
