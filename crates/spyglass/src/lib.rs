//! # Spyglass - Call and Property Spies
//!
//! Spyglass intercepts function calls and property accesses on live objects
//! so tests and diagnostics can observe, log and alter behavior without
//! touching call sites.
//!
//! ## Features
//!
//! - **Function spies**: Log every call with copies of its arguments and
//!   return value, run `before`/`after` hooks, swap in a fake
//! - **Property spies**: Count reads and keep copies of every written value
//! - **Reversible**: Every spy restores the original on reset, even when the
//!   spied object was changed in the meantime
//! - **Observable**: Diagnostics flow through an event dispatcher into
//!   `tracing` or any [`LogSink`](spyglass_observe::LogSink)
//!
//! ## Quick Start
//!
//! ```ignore
//! use spyglass::prelude::*;
//!
//! let object = ObjectRef::new().with("sum", sum);
//! spy_on(&Value::from(&object), "sum")?
//!     .and()
//!     .call_before(print_arguments);
//!
//! object.invoke("sum", &[Value::from(1), Value::from(1)])?;
//! // object.sum.calls == [{ args: [1, 1], return: 2 }]
//!
//! reset_all_spies();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                    spyglass (facade)                    │
//! │          spy_on · Spy · SpyOnModule · builder           │
//! ├──────────────────────────────┬──────────────────────────┤
//! │      spyglass-decorate       │     spyglass-observe     │
//! │  (function and property      │  (activity log, events)  │
//! │   decorators, registries)    │                          │
//! ├──────────────────────────────┴──────────────────────────┤
//! │            spyglass-core (host object model)            │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use spyglass_observe::{default_logger, dispatcher, EventSubscriber};
use tracing_subscriber::EnvFilter;

pub mod chain;
pub mod spy;
pub mod spy_on;

// Re-export main types at crate root
pub use chain::SpyOnModule;
pub use spy::{Spy, SpyId, SpyKind};
pub use spy_on::{reset_all_spies, reset_spy, spy_on};

// Re-export from sub-crates
pub use spyglass_core;
pub use spyglass_decorate;
pub use spyglass_observe;

/// Errors from the spy facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpyError {
    /// The target is not an object, or lacks the property.
    #[error("must spy on a defined object property")]
    UndefinedProperty,
}

/// Result type for spy operations.
pub type SpyResult<T> = Result<T, SpyError>;

/// Main entry point for Spyglass.
pub struct Spyglass;

impl Spyglass {
    /// Create a builder for the process-wide diagnostics setup.
    pub fn builder() -> SpyglassBuilder {
        SpyglassBuilder::new()
    }
}

/// Builder for the process-wide diagnostics setup.
///
/// Spies work without it; it only decides where their diagnostics go.
pub struct SpyglassBuilder {
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
    logging: bool,
    tracing_filter: Option<String>,
}

impl SpyglassBuilder {
    /// Create a builder that keeps the default logging subscriber.
    pub fn new() -> Self {
        Self {
            event_subscribers: Vec::new(),
            logging: true,
            tracing_filter: None,
        }
    }

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Keep or drop the default subscriber that logs events through `tracing`.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Install a `tracing` formatter, filtered by `RUST_LOG` or else by
    /// `directives`.
    pub fn with_tracing(mut self, directives: impl Into<String>) -> Self {
        self.tracing_filter = Some(directives.into());
        self
    }

    /// Apply the setup to the process-wide dispatcher.
    pub fn install(self) {
        let dispatcher = dispatcher();
        let logger = default_logger();
        if self.logging {
            if !dispatcher.is_subscribed(logger) {
                dispatcher.subscribe(Arc::clone(logger));
            }
        } else {
            dispatcher.unsubscribe(logger);
        }

        for subscriber in self.event_subscribers {
            dispatcher.subscribe(subscriber);
        }

        if let Some(directives) = self.tracing_filter {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(directives));
            // Another subscriber may already be installed.
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
        }

        tracing::debug!(
            subscribers = dispatcher.subscriber_count(),
            logging = self.logging,
            "Spyglass diagnostics installed"
        );
    }
}

impl Default for SpyglassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{
        reset_all_spies, reset_spy, spy_on, Spy, SpyError, SpyKind, SpyOnModule, SpyResult,
        Spyglass, SpyglassBuilder,
    };

    // Object model
    pub use spyglass_core::{
        deep_clone, ArrayRef, Exception, ObjectRef, Pending, PropertyDescriptor, Value,
    };

    // Decorators
    pub use spyglass_decorate::{
        decorate_function, decorate_property, revert_decorated_function,
        revert_decorated_property, DecoratorConfig,
    };

    // Observability
    pub use spyglass_observe::{
        ActivityEntry, CallRecord, CollectingSubscriber, EventSubscriber, LogSink, SpyEvent,
    };
}

/// Serializes tests that deploy spies, since the spy list is process-wide.
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::LazyLock<parking_lot::Mutex<()>> =
    std::sync::LazyLock::new(|| parking_lot::Mutex::new(()));
