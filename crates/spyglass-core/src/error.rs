//! Core error types for Spyglass.
//!
//! Two kinds of failure exist in the host object model: an [`Exception`]
//! raised by running code (a callable, getter or setter), and an
//! [`ObjectError`] raised by structural operations on the property table.

use thiserror::Error;

/// Category of a raised exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// A generic error raised by user code.
    Error,
    /// An operation was applied to a value of the wrong type.
    TypeError,
}

impl ExceptionKind {
    /// Get the kind name as it appears in messages.
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::Error => "Error",
            ExceptionKind::TypeError => "TypeError",
        }
    }
}

/// An exception thrown while running a callable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Exception {
    /// The kind of exception.
    pub kind: ExceptionKind,
    /// Human-readable message.
    pub message: String,
}

impl Exception {
    /// Create a generic exception.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::Error,
            message: message.into(),
        }
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: ExceptionKind::TypeError,
            message: message.into(),
        }
    }

    /// Check if this is a type error.
    pub fn is_type_error(&self) -> bool {
        self.kind == ExceptionKind::TypeError
    }
}

/// Errors from structural operations on objects.
#[derive(Debug, Clone, Error)]
pub enum ObjectError {
    /// The property exists and cannot be redefined.
    #[error("Cannot redefine non-configurable property '{0}'")]
    NonConfigurable(String),

    /// The value is not callable.
    #[error("'{0}' is not a function")]
    NotCallable(String),
}

/// Result type for code that may throw.
pub type CallResult<T> = std::result::Result<T, Exception>;

/// Result type for structural object operations.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;
