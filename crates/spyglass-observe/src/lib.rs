//! Spyglass Observability
//!
//! This crate records what spies see and reports what they do, including:
//!
//! - [`activity`]: The `_spy_` activity log kept on spied objects
//! - [`SpyEvent`]: Diagnostics raised by decorators and spies
//! - [`EventDispatcher`]: Observable event system with a process-wide instance
//! - [`LogSink`]: Leveled message sink for plugging in an external logger
//!
//! # Activity Log
//!
//! ```ignore
//! use spyglass_observe::activity;
//!
//! activity::record_read(&object, "count", 1);
//! let entry = activity::entry_of(&object, "count").unwrap();
//! assert_eq!(entry.reads, Some(1));
//! ```
//!
//! # Event Subscription
//!
//! ```ignore
//! use spyglass_observe::{dispatcher, SinkSubscriber};
//! use std::sync::Arc;
//!
//! dispatcher().subscribe(Arc::new(SinkSubscriber::new(my_sink)));
//! ```

pub mod activity;
pub mod events;

// Re-export main types
pub use activity::{ActivityEntry, CallRecord, ACTIVITY_KEY, CALLS_KEY};
pub use events::{
    default_logger, dispatcher, emit, CollectingSubscriber, EventDispatcher, EventSubscriber,
    HookPhase, LogSink, LoggingSubscriber, SinkSubscriber, SpyEvent,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activity::{ActivityEntry, CallRecord};
    pub use crate::events::{EventDispatcher, EventSubscriber, LogSink, SpyEvent};
}
