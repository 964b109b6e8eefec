//! Error types for the dialog engine.

use thiserror::Error;

/// Boxed error carried by storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type shared by dialogs, memory scopes and bot state.
///
/// Invalid arguments, unsupported operations and scope resolution failures
/// are programmer errors. Storage failures are operational and left to the
/// storage backend's own retry policy.
#[derive(Error, Debug)]
pub enum DialogError {
    /// A required argument was missing or malformed
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },

    /// The operation is not supported, e.g. writing to a read-only scope
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A path prefix matched none of the registered memory scopes
    #[error("'{scope}' does not match memory scopes: [{}]", .valid.join(", "))]
    ScopeNotFound { scope: String, valid: Vec<String> },

    /// A dialog id was not registered in the current or any parent dialog set
    #[error("Dialog '{dialog_id}' not found: {message}")]
    DialogNotFound { dialog_id: String, message: String },

    /// The engine was driven into a state it cannot act on
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage backend failure
    #[error("Storage operation '{operation}' failed: {source}")]
    Storage {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DialogError {
    /// Creates an InvalidArgument error
    pub fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            message: message.into(),
        }
    }

    /// Creates an Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Creates a DialogNotFound error
    pub fn dialog_not_found(dialog_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DialogNotFound {
            dialog_id: dialog_id.into(),
            message: message.into(),
        }
    }

    /// Creates an InvalidState error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a Storage error
    pub fn storage(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Check if this is an InvalidArgument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if this is an Unsupported error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Check if this is a ScopeNotFound error
    pub fn is_scope_not_found(&self) -> bool {
        matches!(self, Self::ScopeNotFound { .. })
    }

    /// Check if this is a Storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

impl From<config::ConfigError> for DialogError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// A type alias for `Result<T, DialogError>`.
pub type DialogResult<T> = std::result::Result<T, DialogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_not_found_lists_valid_scopes() {
        let err = DialogError::ScopeNotFound {
            scope: "bogus".to_string(),
            valid: vec!["turn".to_string(), "dialog".to_string()],
        };

        assert!(err.is_scope_not_found());
        assert_eq!(
            err.to_string(),
            "'bogus' does not match memory scopes: [turn, dialog]"
        );
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = DialogError::storage("write", io);

        assert!(err.is_storage());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk on fire"));
    }
}
