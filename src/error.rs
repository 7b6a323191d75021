//! Error types for opskeeper operations.

use thiserror::Error;

/// Result type alias using [`OpskeeperError`].
pub type Result<T> = std::result::Result<T, OpskeeperError>;

/// Errors that can occur during rotation or export runs.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum OpskeeperError {
    /// Rotation is not enabled on the secret.
    #[error("secret {0} is not enabled for rotation")]
    RotationNotEnabled(String),

    /// The request token does not appear in the secret's version map.
    #[error("secret version {token} has no stage for rotation of secret {secret}")]
    UnknownVersion {
        /// Secret ARN or identifier
        secret: String,
        /// Client request token for the in-flight rotation
        token: String,
    },

    /// The request token exists but is not staged as pending.
    #[error("secret version {token} not set as pending for rotation of secret {secret}")]
    VersionNotPending {
        /// Secret ARN or identifier
        secret: String,
        /// Client request token for the in-flight rotation
        token: String,
    },

    /// The rotation event carried a step name outside the four-step contract.
    #[error("invalid rotation step: {0}")]
    InvalidStep(String),

    /// Secret, version, or parameter was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required environment variable is missing.
    #[error("required environment variable {0} is not set")]
    MissingConfig(&'static str),

    /// The service asked us to slow down; the caller may retry.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Throttling outlasted the bounded retry loop.
    #[error("gave up creating export task for {log_group} after {attempts} throttled attempts")]
    RetriesExhausted {
        /// Log group whose export submission kept throttling
        log_group: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OpskeeperError {
    /// True when the error is a rate-limit signal worth retrying.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// True when the error means the requested thing does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = OpskeeperError::RotationNotEnabled("arn:aws:secretsmanager:x".to_string());
        assert_eq!(
            err.to_string(),
            "secret arn:aws:secretsmanager:x is not enabled for rotation"
        );
    }

    #[test]
    fn test_version_errors_name_secret_and_token() {
        let err = OpskeeperError::UnknownVersion {
            secret: "arn:x".to_string(),
            token: "v2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("arn:x"));
        assert!(msg.contains("v2"));
    }

    #[test]
    fn test_throttling_predicate() {
        assert!(OpskeeperError::Throttled("LimitExceededException".to_string()).is_throttling());
        assert!(!OpskeeperError::NotFound("x".to_string()).is_throttling());
    }

    #[test]
    fn test_error_source_chain() {
        let inner = anyhow::anyhow!("root cause");
        let err = OpskeeperError::Other(inner.context("while exporting"));
        assert!(err.source().is_some());
    }
}
