//! Error types for the gaindalf core.

use crate::uid::Uid;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An engine invariant would be violated. Never retried.
    Consistency,
    /// The caller used the API incorrectly.
    Usage,
    /// The supplied data was rejected; a different input may succeed.
    Validation,
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stale entity, journal or session was used where a current one is required.
    #[error("{target} has been superseded")]
    Superseded {
        /// Human readable description of the stale object.
        target: String,
    },

    /// A different current entity already holds this UID.
    #[error("duplicate uid: {uid}")]
    DuplicateUid {
        /// The contested UID.
        uid: Uid,
    },

    /// No current entity exists for this UID.
    #[error("entity not found: {uid}")]
    EntityNotFound {
        /// The UID that was looked up.
        uid: Uid,
    },

    /// No schema is registered for a namespace.
    #[error("unknown namespace: {namespace}")]
    UnknownNamespace {
        /// The namespace that was looked up.
        namespace: String,
    },

    /// A schema is already registered for a namespace.
    #[error("schema already registered for namespace {namespace}")]
    DuplicateSchema {
        /// The contested namespace.
        namespace: String,
    },

    /// A namespace string is not acceptable.
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        /// The rejected namespace.
        namespace: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A UID string could not be parsed.
    #[error("invalid uid string {input:?}")]
    InvalidUid {
        /// The rejected input.
        input: String,
    },

    /// An audit entry carried the wrong version.
    #[error("audit version mismatch for {uid}: expected {expected}, got {actual}")]
    AuditVersionMismatch {
        /// Entity the audit log belongs to.
        uid: Uid,
        /// Version the log expected next.
        expected: u64,
        /// Version the entry carried.
        actual: u64,
    },

    /// An audit entry is not allowed in the log's current state.
    #[error("invalid audit entry for {uid}: {message}")]
    AuditSequence {
        /// Entity the audit log belongs to.
        uid: Uid,
        /// Description of the violation.
        message: String,
    },

    /// Another session is already active on this manager.
    #[error("a session is already active")]
    SessionAlreadyActive,

    /// Commit could not order or finish the dirty journals.
    #[error("commit ordering violated: {message}")]
    CommitOrder {
        /// Description of the violation.
        message: String,
    },

    /// The field is not declared by the entity's schema.
    #[error("unknown field {field} on {namespace}")]
    UnknownField {
        /// Schema namespace.
        namespace: String,
        /// The unknown field name.
        field: String,
    },

    /// The field cannot be written.
    #[error("field {field} on {namespace} is read-only")]
    ReadOnlyField {
        /// Schema namespace.
        namespace: String,
        /// The field name.
        field: String,
    },

    /// The field must be mutated through its collection API, not reassigned.
    #[error("field {field} on {namespace} is protected and cannot be reassigned")]
    ProtectedField {
        /// Schema namespace.
        namespace: String,
        /// The field name.
        field: String,
    },

    /// A journalled collection was asked to copy its original twice.
    #[error("journalled collection already diverged from its original")]
    AlreadyCloned,

    /// A frozen object was mutated.
    #[error("{target} is frozen")]
    Frozen {
        /// What was frozen.
        target: &'static str,
    },

    /// An index was outside a sequence's bounds.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Sequence length.
        len: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A value does not have the type its field declares.
    #[error("type mismatch on {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The field being checked.
        field: String,
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// A UID or entity reference belongs to the wrong namespace.
    #[error("namespace mismatch on {field}: expected {expected}, got {actual}")]
    NamespaceMismatch {
        /// The field being checked.
        field: String,
        /// Expected namespace.
        expected: String,
        /// Actual namespace.
        actual: String,
    },

    /// A required field is missing or null.
    #[error("missing required field {field} on {namespace}")]
    MissingField {
        /// Schema namespace.
        namespace: String,
        /// The field name.
        field: String,
    },

    /// A schema validator rejected the entity.
    #[error("validation failed on {namespace}: {message}")]
    ValidationFailed {
        /// Schema namespace.
        namespace: String,
        /// Validator message.
        message: String,
    },

    /// JSON export failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a superseded error.
    pub fn superseded(target: impl Into<String>) -> Self {
        Self::Superseded {
            target: target.into(),
        }
    }

    /// Creates a commit ordering error.
    pub fn commit_order(message: impl Into<String>) -> Self {
        Self::CommitOrder {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an audit sequence error.
    pub fn audit_sequence(uid: &Uid, message: impl Into<String>) -> Self {
        Self::AuditSequence {
            uid: uid.clone(),
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Superseded { .. }
            | Self::DuplicateUid { .. }
            | Self::AuditVersionMismatch { .. }
            | Self::AuditSequence { .. }
            | Self::CommitOrder { .. }
            | Self::Json(_) => ErrorKind::Consistency,
            Self::EntityNotFound { .. }
            | Self::UnknownNamespace { .. }
            | Self::DuplicateSchema { .. }
            | Self::SessionAlreadyActive
            | Self::UnknownField { .. }
            | Self::ReadOnlyField { .. }
            | Self::ProtectedField { .. }
            | Self::AlreadyCloned
            | Self::Frozen { .. }
            | Self::IndexOutOfRange { .. }
            | Self::InvalidOperation { .. } => ErrorKind::Usage,
            Self::InvalidNamespace { .. }
            | Self::InvalidUid { .. }
            | Self::TypeMismatch { .. }
            | Self::NamespaceMismatch { .. }
            | Self::MissingField { .. }
            | Self::ValidationFailed { .. } => ErrorKind::Validation,
        }
    }

    /// Returns true if this error reports a superseded object.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            CoreError::superseded("entity Ledger-1 v1").kind(),
            ErrorKind::Consistency
        );
        assert_eq!(CoreError::AlreadyCloned.kind(), ErrorKind::Usage);
        assert_eq!(
            CoreError::type_mismatch("amount", "integer", "text").kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn display_messages() {
        let err = CoreError::superseded("session Session-2");
        assert_eq!(err.to_string(), "session Session-2 has been superseded");

        let err = CoreError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "index 4 out of range for length 2");
    }
}
