//! Error types for container operations

use omx_core::{CoreError, ElementType, EntryKind, ErrorCategory};
use thiserror::Error;

/// Errors surfaced by container, lookup and import operations
#[derive(Debug, Error)]
pub enum Error {
    /// A structural precondition prevents the operation
    #[error("bad format: {0}")]
    BadFormat(String),

    /// Dimensions disagree with the container shape
    #[error("this omx has shape {expected:?} but got {found:?}")]
    IncompatibleShape { expected: (u64, u64), found: Vec<u64> },

    /// Resolution was requested against a lookup with duplicate values
    #[error("lookup '{name}' does not have unique labels for each item")]
    NonUniqueLookup { name: String },

    #[error("{kind} named '{name}' not found")]
    NotFound { kind: EntryKind, name: String },

    #[error("{kind} named '{name}' already exists")]
    AlreadyExists { kind: EntryKind, name: String },

    /// A bulk import stopped; chunks before `chunk` remain committed
    #[error("import aborted at chunk {chunk}: {reason}")]
    ImportAborted { chunk: usize, reason: String },

    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ElementType, found: ElementType },

    #[error("container is opened read-only")]
    ReadOnly,

    #[error("format error: {0}")]
    Core(CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::BadFormat(_) => ErrorCategory::BadFormat,
            Error::IncompatibleShape { .. } => ErrorCategory::IncompatibleShape,
            Error::NonUniqueLookup { .. } => ErrorCategory::NonUniqueLookup,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::ImportAborted { .. } => ErrorCategory::ImportAborted,
            Error::AlreadyExists { .. }
            | Error::InvalidName(_)
            | Error::TypeMismatch { .. }
            | Error::ReadOnly => ErrorCategory::InvalidInput,
            Error::Core(e) => e.category(),
            Error::Io(_) => ErrorCategory::Io,
            Error::Json(_) | Error::Csv(_) => ErrorCategory::BadFormat,
        }
    }

    pub(crate) fn not_found(kind: EntryKind, name: &str) -> Self {
        Error::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn aborted(chunk: usize, reason: impl std::fmt::Display) -> Self {
        Error::ImportAborted {
            chunk,
            reason: reason.to_string(),
        }
    }
}

/// Result type for container operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = Error::IncompatibleShape {
            expected: (3, 3),
            found: vec![3, 4],
        };
        assert_eq!(err.category(), ErrorCategory::IncompatibleShape);
        assert_eq!(err.to_string(), "this omx has shape (3, 3) but got [3, 4]");

        assert_eq!(
            Error::Core(CoreError::ShapeUnset).category(),
            ErrorCategory::BadFormat
        );
        assert_eq!(Error::aborted(2, "boom").category(), ErrorCategory::ImportAborted);
    }
}
