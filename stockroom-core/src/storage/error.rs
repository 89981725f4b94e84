//! Storage errors - the closed taxonomy every backend maps into.
//!
//! Mapping to transport responses (status codes, messages) is the caller's job.

use uuid::Uuid;

use crate::model::ValidationErrors;

/// Errors crossing the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Identifier failed UUID syntax checking
    #[error("ID is not in its proper form")]
    InvalidId,

    /// Identifier well-formed but no such record
    #[error("record not found")]
    NotFound,

    /// Authenticated but not allowed to touch the target
    #[error("attempted action is not allowed")]
    Forbidden,

    /// Bad credentials; never says which part was wrong
    #[error("authentication failed")]
    AuthenticationFailure,

    /// One or more field-level violations
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Store unreachable, or a stored record could not be decoded
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Store-level failure with context.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// The uniqueness violation on email, reported identically by both backends.
    #[must_use]
    pub fn email_taken() -> Self {
        Self::Validation(ValidationErrors::single("email", "email already in use"))
    }

    /// Check if this is a validation failure on `field`.
    #[must_use]
    pub fn is_validation_on(&self, field: &str) -> bool {
        matches!(self, Self::Validation(errors) if errors.has_field(field))
    }
}

impl From<ValidationErrors> for StorageError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Check UUID syntax and return the canonical (lowercase, hyphenated) form.
///
/// # Errors
/// `StorageError::InvalidId` if `id` is not a UUID.
pub fn parse_id(id: &str) -> StorageResult<String> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| StorageError::InvalidId)
}

/// Fresh random identifier.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_canonicalizes() {
        let id = parse_id("5CF37266-3473-4006-984F-9325122678B7").unwrap();
        assert_eq!(id, "5cf37266-3473-4006-984f-9325122678b7");

        let id = parse_id("5cf3726634734006984f9325122678b7").unwrap();
        assert_eq!(id, "5cf37266-3473-4006-984f-9325122678b7");
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(parse_id("not-a-uuid"), Err(StorageError::InvalidId));
        assert_eq!(parse_id(""), Err(StorageError::InvalidId));
    }

    #[test]
    fn test_email_taken_is_validation() {
        let err = StorageError::email_taken();
        assert!(err.is_validation_on("email"));
        assert!(!err.is_validation_on("name"));
    }
}
