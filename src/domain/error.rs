//! Saga error taxonomy.
//!
//! Every stage is a dead end for its own errors: they are logged and the
//! chain for that user stops. The variants exist so the log line, the
//! persisted `last_error` and the metrics label say *why* it stopped.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised inside the provisioning saga.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SagaError {
    /// The user row a stage needs is missing.
    #[error("user {0} not found")]
    UserNotFound(Uuid),

    /// Registration attempted for an identity that already has a row.
    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    /// An external collaborator failed (timeout, 4xx/5xx, malformed body).
    #[error("{service} error: {message}")]
    External {
        /// Collaborator name, e.g. `ledger`.
        service: &'static str,
        /// Human-readable cause.
        message: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compare-and-swap on the user row lost against a concurrent writer.
    #[error("version conflict on user {user_id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Row that was being saved.
        user_id: Uuid,
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// Input rejected before any external call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SagaError {
    /// Build an external-service error from anything displayable.
    pub fn external(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::External {
            service,
            message: err.to_string(),
        }
    }

    /// Build a storage error, keeping the full `anyhow` context chain.
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    /// Whether this error means "the thing already exists" (never fatal
    /// for an idempotent stage).
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::UserAlreadyExists(_))
    }

    /// Whether retrying the same write against a fresh read may succeed.
    pub const fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Short label used for metrics and the persisted `last_error`.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "user_not_found",
            Self::UserAlreadyExists(_) => "already_exists",
            Self::External { .. } => "external",
            Self::Serialization(_) => "serialization",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for SagaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_error_display() {
        let err = SagaError::external("ledger", "503 Service Unavailable");
        assert_eq!(err.to_string(), "ledger error: 503 Service Unavailable");
        assert_eq!(err.kind(), "external");
    }

    #[test]
    fn test_error_classification() {
        assert!(SagaError::UserAlreadyExists("a@b.c".into()).is_already_exists());
        assert!(!SagaError::UserNotFound(Uuid::nil()).is_already_exists());

        let conflict = SagaError::VersionConflict {
            user_id: Uuid::nil(),
            expected: 1,
            found: 2,
        };
        assert!(conflict.is_version_conflict());
        assert_eq!(conflict.kind(), "version_conflict");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: SagaError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
