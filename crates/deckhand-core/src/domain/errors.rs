//! Domain error types
//!
//! Errors for domain-level operations: validation failures and invalid
//! sync-status transitions. Storage and gateway failures have their own
//! taxonomies at the respective port boundaries.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing or validation error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid etag token
    #[error("Invalid etag: {0}")]
    InvalidEtag(String),

    /// Invalid server URL
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    /// Invalid credential reference
    #[error("Invalid credential reference: {0}")]
    InvalidCredentialRef(String),

    /// Invalid sync status transition attempt
    #[error("Invalid sync status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status
        from: &'static str,
        /// The attempted target status
        to: &'static str,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidId("bad".to_string());
        assert_eq!(err.to_string(), "Invalid ID format: bad");

        let err = DomainError::InvalidTransition {
            from: "Clean",
            to: "Pushing",
        };
        assert_eq!(
            err.to_string(),
            "Invalid sync status transition from Clean to Pushing"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::ValidationFailed("x".to_string());
        let err2 = DomainError::ValidationFailed("x".to_string());
        assert_eq!(err1, err2);
    }
}
