//! Error types for the decorators.

use spyglass_observe::{HookPhase, SpyEvent};
use thiserror::Error;

/// Errors raised when decorating a callable.
#[derive(Debug, Clone, Error)]
pub enum DecorateError {
    /// The named property does not exist.
    #[error("{0} is not a defined property")]
    MissingProperty(String),

    /// The named property does not hold a callable.
    #[error("{0} is not a function")]
    NotCallable(String),

    /// The named property is a read-only data slot.
    #[error("Cannot install decorated function on read-only property '{0}'")]
    ReadOnly(String),

    /// Installing the decorated callable on its host raised an error.
    #[error("Failed to install decorated function '{name}': {reason}")]
    InstallFailed {
        /// The property name.
        name: String,
        /// The reason for failure.
        reason: String,
    },
}

/// Errors raised when decorating a property.
///
/// None of these are fatal: the property is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// The property is not an own property of the object.
    #[error("{0} is not a defined property")]
    Missing(String),

    /// The property cannot be redefined.
    #[error("{0} is not a configurable property")]
    NonConfigurable(String),

    /// The property is a data slot that cannot be assigned.
    #[error("{0} is a read-only property")]
    ReadOnly(String),

    /// The property is already decorated.
    #[error("{0} is already decorated")]
    AlreadyDecorated(String),
}

impl PropertyError {
    /// Get the diagnostic event for this error.
    pub fn to_event(&self) -> SpyEvent {
        match self.clone() {
            PropertyError::Missing(property) => SpyEvent::MissingProperty { property },
            PropertyError::NonConfigurable(property) => SpyEvent::NonConfigurable { property },
            PropertyError::ReadOnly(property) => SpyEvent::ReadOnly { property },
            PropertyError::AlreadyDecorated(property) => SpyEvent::AlreadyDecorated { property },
        }
    }
}

/// A hook, fake or original callable raised an error during a decorated call.
#[derive(Debug, Clone, Error)]
#[error("an error occurred while calling {}: {message}", .phase.as_str())]
pub struct HookError {
    /// Where the error was raised.
    pub phase: HookPhase,
    /// The error message.
    pub message: String,
}

impl HookError {
    /// Marker logged as the return value of a failed primary call.
    pub fn return_marker(&self) -> String {
        format!("Error: {}", self.message)
    }
}

/// Result type for function decoration.
pub type DecorateResult<T> = std::result::Result<T, DecorateError>;

/// Result type for property decoration.
pub type PropertyResult<T> = std::result::Result<T, PropertyError>;
