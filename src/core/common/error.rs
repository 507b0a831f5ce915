//! Error types for the store.
//!
//! Follows the host codebase's convention of a single hand-rolled error enum
//! with manual `Display`/`Error` impls rather than a derive-macro crate: each
//! variant maps directly onto one of the wire-level exception identifiers in
//! the DynamoDB-compatible contract (see module docs on `crate::core::store`).

use std::fmt;

use crate::core::transaction::coordinator::CancellationReason;

/// Errors produced anywhere in the store.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Malformed request: missing key attribute, too many transaction items,
    /// empty transaction, duplicate keys within one transaction, or an update
    /// expression that references the same attribute path from two clauses.
    Validation(String),
    /// A referenced table does not exist.
    ResourceNotFound(String),
    /// `CreateTable` for a name that already exists.
    ResourceInUse(String),
    /// A single-item `ConditionExpression` evaluated to `false`.
    ConditionalCheckFailed(String),
    /// Lock acquisition could not complete within the contention budget.
    TransactionConflict(String),
    /// A `TransactWriteItems` call aborted; carries one reason per input op,
    /// in input order.
    TransactionCanceled(Vec<CancellationReason>),
    /// The local shard store failed to read or write its backing file.
    Internal(String),
    /// Wrapped `std::io::Error` from the shard store's file operations.
    Io(String),
    /// Wrapped `serde_json::Error` from catalog or attribute-value (de)serialization.
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "ValidationException: {msg}"),
            Self::ResourceNotFound(msg) => write!(f, "ResourceNotFoundException: {msg}"),
            Self::ResourceInUse(msg) => write!(f, "ResourceInUseException: {msg}"),
            Self::ConditionalCheckFailed(msg) => {
                write!(f, "ConditionalCheckFailedException: {msg}")
            }
            Self::TransactionConflict(msg) => write!(f, "TransactionConflictException: {msg}"),
            Self::TransactionCanceled(reasons) => {
                write!(f, "TransactionCanceledException: {reasons:?}")
            }
            Self::Internal(msg) => write!(f, "InternalServerError: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_match_wire_type_names() {
        assert!(StoreError::Validation("x".into()).to_string().starts_with("ValidationException"));
        assert!(StoreError::ResourceNotFound("x".into())
            .to_string()
            .starts_with("ResourceNotFoundException"));
        assert!(StoreError::ResourceInUse("x".into())
            .to_string()
            .starts_with("ResourceInUseException"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
