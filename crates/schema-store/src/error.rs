//! Error types for schema and store operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for schema-store operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while compiling a schema or working with a store.
///
/// Errors are `Clone` so that they can travel through shared futures when a
/// method auto-resolves a pending argument.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Invalid schema definition, reported at compile time.
    #[error("{message}")]
    Schema {
        /// Description of the offending definition.
        message: String,
    },

    /// A value or a data tree was rejected by its type.
    #[error("{message}")]
    Validation {
        /// The type's validation message.
        message: String,
    },

    /// A reference could not be dereferenced.
    #[error("{message}")]
    Reference {
        /// Description of the dangling reference.
        message: String,
    },

    /// A reference has no enclosing collection of its target type.
    #[error("{message}")]
    MissingCollection {
        /// Description of the lookup that failed.
        message: String,
    },

    /// Path does not resolve in the state tree or the object graph.
    #[error("Path \"{path}\" not found in state.")]
    PathNotFound {
        /// The path that was not found.
        path: Path,
    },

    /// A write was attempted while a read trace was recording.
    #[error("cannot write to \"{path}\" while a read trace is active")]
    Reentrancy {
        /// The path of the rejected write.
        path: Path,
    },

    /// The store has no dispatcher connected.
    #[error("store has no dispatcher connected")]
    NoDispatcher,

    /// The store backing an instance has been dropped.
    #[error("store has been dropped")]
    StoreDropped,

    /// Invalid operation error.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Create a schema error.
    #[inline]
    pub fn schema(message: impl Into<String>) -> Self {
        ModelError::Schema {
            message: message.into(),
        }
    }

    /// Create a validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        ModelError::Validation {
            message: message.into(),
        }
    }

    /// Create a reference error.
    #[inline]
    pub fn reference(message: impl Into<String>) -> Self {
        ModelError::Reference {
            message: message.into(),
        }
    }

    /// Create a missing collection error.
    #[inline]
    pub fn missing_collection(message: impl Into<String>) -> Self {
        ModelError::MissingCollection {
            message: message.into(),
        }
    }

    /// Create a path not found error.
    #[inline]
    pub fn path_not_found(path: Path) -> Self {
        ModelError::PathNotFound { path }
    }

    /// Create a reentrancy error.
    #[inline]
    pub fn reentrancy(path: Path) -> Self {
        ModelError::Reentrancy { path }
    }

    /// Create an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ModelError::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the type-error family: schema
    /// definitions, rejected values and missing collections.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            ModelError::Schema { .. }
                | ModelError::Validation { .. }
                | ModelError::MissingCollection { .. }
        )
    }

    /// Whether this error is a dangling-reference error.
    #[inline]
    pub fn is_reference_error(&self) -> bool {
        matches!(self, ModelError::Reference { .. })
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = ModelError::path_not_found(path!("todos", "abc"));
        assert_eq!(err.to_string(), "Path \"todos.abc\" not found in state.");

        let err = ModelError::validation("Type of \"text\" must be string");
        assert_eq!(err.to_string(), "Type of \"text\" must be string");
    }

    #[test]
    fn test_error_families() {
        assert!(ModelError::schema("bad").is_type_error());
        assert!(ModelError::validation("bad").is_type_error());
        assert!(ModelError::missing_collection("none").is_type_error());
        assert!(!ModelError::reference("dangling").is_type_error());
        assert!(ModelError::reference("dangling").is_reference_error());
        assert!(!ModelError::NoDispatcher.is_type_error());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: ModelError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
