use core::result::Result as CoreResult;

use thiserror::Error;

use crate::job::JobId;

/// Result type for job engine operations.
pub type Result<T> = CoreResult<T, EngineError>;

/// Errors surfaced by the job engine and its facade.
///
/// Provider failures never appear here; the router absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No job with this id exists (never submitted, or pruned).
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The request was rejected before any work started.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The engine itself failed.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The result store rejected a result.
    #[error("Result store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EngineError::InvalidRequest("empty payload".to_owned());
        assert_eq!(error.to_string(), "Invalid request: empty payload");

        let error = EngineError::Store("disk full".to_owned());
        assert_eq!(error.to_string(), "Result store error: disk full");
    }
}
