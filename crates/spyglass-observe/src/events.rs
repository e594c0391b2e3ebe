//! Observable events raised while spying.
//!
//! Every diagnostic the decorators and the spy facade produce is a
//! [`SpyEvent`] sent through the process-wide [`EventDispatcher`]. By default
//! the dispatcher carries a single [`LoggingSubscriber`] that turns events into
//! `tracing` records; a [`LogSink`] can be attached with [`SinkSubscriber`].

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::Level;

/// Stage of a decorated call in which a hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// The `before` hook.
    Before,
    /// The fake or original callable.
    Primary,
    /// The `after` hook.
    After,
}

impl HookPhase {
    /// Get the phase name as it appears in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::Before => "before",
            HookPhase::Primary => "the spied function",
            HookPhase::After => "after",
        }
    }
}

/// Events that can be observed while spying.
#[derive(Debug, Clone)]
pub enum SpyEvent {
    /// A decorated callable was invoked.
    FunctionCalled {
        /// Property name, empty for a directly decorated callable.
        name: String,
        /// Whether the call went through to the fake or original.
        call_through: bool,
    },
    /// A decorated property was read.
    PropertyRead {
        /// Property name.
        property: String,
        /// Total reads so far.
        reads: u64,
    },
    /// A decorated property was written.
    PropertyWritten {
        /// Property name.
        property: String,
        /// Rendering of the new value.
        value: String,
    },
    /// A hook or the primary call raised an error.
    HookFailed {
        /// Where it failed.
        phase: HookPhase,
        /// Property name of the decorated callable.
        name: String,
        /// Error message.
        message: String,
    },
    /// The property to decorate does not exist.
    MissingProperty {
        /// Property name.
        property: String,
    },
    /// The property to decorate is not configurable.
    NonConfigurable {
        /// Property name.
        property: String,
    },
    /// The property to decorate is a read-only data slot.
    ReadOnly {
        /// Property name.
        property: String,
    },
    /// The property is already decorated.
    AlreadyDecorated {
        /// Property name.
        property: String,
    },
    /// A callable could not be decorated.
    DecorationFailed {
        /// Property name.
        property: String,
        /// The decorator's error.
        reason: String,
    },
    /// A reversal left the host slot untouched.
    RevertSkipped {
        /// Property name.
        name: String,
        /// Why the slot was kept.
        reason: String,
    },
    /// A reversal was requested for a callable that is not decorated.
    NotDecorated {
        /// Property name, if known.
        name: String,
    },
    /// A spy was reset while already inactive.
    SpyInactive {
        /// Property name.
        property: String,
    },
    /// A hook could not be attached.
    InvalidHook {
        /// Hook name (`before`, `after` or `fake`).
        hook: &'static str,
        /// Why it was refused.
        reason: String,
    },
}

impl SpyEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SpyEvent::FunctionCalled { .. } => "function_called",
            SpyEvent::PropertyRead { .. } => "property_read",
            SpyEvent::PropertyWritten { .. } => "property_written",
            SpyEvent::HookFailed { .. } => "hook_failed",
            SpyEvent::MissingProperty { .. } => "missing_property",
            SpyEvent::NonConfigurable { .. } => "non_configurable",
            SpyEvent::ReadOnly { .. } => "read_only",
            SpyEvent::AlreadyDecorated { .. } => "already_decorated",
            SpyEvent::DecorationFailed { .. } => "decoration_failed",
            SpyEvent::RevertSkipped { .. } => "revert_skipped",
            SpyEvent::NotDecorated { .. } => "not_decorated",
            SpyEvent::SpyInactive { .. } => "spy_inactive",
            SpyEvent::InvalidHook { .. } => "invalid_hook",
        }
    }

    /// Severity of the event.
    pub fn level(&self) -> Level {
        match self {
            SpyEvent::HookFailed { .. }
            | SpyEvent::MissingProperty { .. }
            | SpyEvent::NonConfigurable { .. }
            | SpyEvent::ReadOnly { .. }
            | SpyEvent::DecorationFailed { .. } => Level::ERROR,
            SpyEvent::InvalidHook { .. } | SpyEvent::RevertSkipped { .. } => Level::WARN,
            SpyEvent::FunctionCalled { .. }
            | SpyEvent::PropertyRead { .. }
            | SpyEvent::PropertyWritten { .. }
            | SpyEvent::AlreadyDecorated { .. }
            | SpyEvent::NotDecorated { .. }
            | SpyEvent::SpyInactive { .. } => Level::INFO,
        }
    }

    /// Human-readable message, as delivered to a [`LogSink`].
    pub fn message(&self) -> String {
        match self {
            SpyEvent::FunctionCalled { name, .. } => format!("spied on {}", name),
            SpyEvent::PropertyRead { property, reads } => format!(
                "read value of {} a total of {} time{}",
                property,
                reads,
                if *reads == 1 { "" } else { "s" }
            ),
            SpyEvent::PropertyWritten { property, value } => {
                format!("value of {} updated to {}", property, value)
            }
            SpyEvent::HookFailed { phase, message, .. } => format!(
                "an error occurred while calling {}: {}",
                phase.as_str(),
                message
            ),
            SpyEvent::MissingProperty { property } => {
                format!("{} is not a defined property", property)
            }
            SpyEvent::NonConfigurable { property } => {
                format!("{} is not a configurable property", property)
            }
            SpyEvent::ReadOnly { property } => format!("{} is a read-only property", property),
            SpyEvent::AlreadyDecorated { property } => {
                format!("{} is already decorated", property)
            }
            SpyEvent::DecorationFailed { property, reason } => {
                format!("unable to spy on {}: {}", property, reason)
            }
            SpyEvent::RevertSkipped { name, reason } => {
                format!("{} was not restored: {}", name, reason)
            }
            SpyEvent::NotDecorated { name } => format!("{} is not a decorated function", name),
            SpyEvent::SpyInactive { property } => {
                format!("spy on {} has already been reset", property)
            }
            SpyEvent::InvalidHook { hook, reason } => {
                format!("unable to set {}: {}", hook, reason)
            }
        }
    }
}

/// Subscriber for spy events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SpyEvent);

    /// Filter for event types this subscriber is interested in.
    /// Returns `None` to receive all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that writes events as `tracing` records.
pub struct LoggingSubscriber {
    /// Most verbose level that is forwarded.
    pub log_level: Level,
}

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self {
            log_level: Level::INFO,
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &SpyEvent) {
        // Level ordering puts TRACE above ERROR.
        if event.level() > self.log_level {
            return;
        }

        match event {
            SpyEvent::FunctionCalled { name, call_through } => {
                tracing::info!(
                    event = "function_called",
                    name = %name,
                    call_through = call_through,
                    "Spied function called"
                );
            }
            SpyEvent::PropertyRead { property, reads } => {
                tracing::info!(
                    event = "property_read",
                    property = %property,
                    reads = reads,
                    "Spied property read"
                );
            }
            SpyEvent::PropertyWritten { property, value } => {
                tracing::info!(
                    event = "property_written",
                    property = %property,
                    value = %value,
                    "Spied property written"
                );
            }
            SpyEvent::HookFailed {
                phase,
                name,
                message,
            } => {
                tracing::error!(
                    event = "hook_failed",
                    phase = phase.as_str(),
                    name = %name,
                    message = %message,
                    "Error while calling {}",
                    phase.as_str()
                );
            }
            SpyEvent::MissingProperty { property }
            | SpyEvent::NonConfigurable { property }
            | SpyEvent::ReadOnly { property } => {
                tracing::error!(
                    event = event.event_type(),
                    property = %property,
                    "Property cannot be decorated"
                );
            }
            SpyEvent::AlreadyDecorated { property } => {
                tracing::info!(
                    event = "already_decorated",
                    property = %property,
                    "Property already decorated"
                );
            }
            SpyEvent::DecorationFailed { property, reason } => {
                tracing::error!(
                    event = "decoration_failed",
                    property = %property,
                    reason = %reason,
                    "Function cannot be decorated"
                );
            }
            SpyEvent::RevertSkipped { name, reason } => {
                tracing::warn!(
                    event = "revert_skipped",
                    name = %name,
                    reason = %reason,
                    "Reversal left slot untouched"
                );
            }
            SpyEvent::NotDecorated { name } => {
                tracing::info!(
                    event = "not_decorated",
                    name = %name,
                    "Nothing to revert"
                );
            }
            SpyEvent::SpyInactive { property } => {
                tracing::info!(
                    event = "spy_inactive",
                    property = %property,
                    "Spy already reset"
                );
            }
            SpyEvent::InvalidHook { hook, reason } => {
                tracing::warn!(
                    event = "invalid_hook",
                    hook = hook,
                    reason = %reason,
                    "Hook not attached"
                );
            }
        }
    }
}

/// Leveled message sink.
pub trait LogSink: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);

    /// Warning message.
    fn warn(&self, message: &str);

    /// Error message.
    fn error(&self, message: &str);
}

/// A subscriber that forwards event messages to a [`LogSink`].
pub struct SinkSubscriber<S> {
    sink: S,
}

impl<S: LogSink> SinkSubscriber<S> {
    /// Wrap a sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Get the wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: LogSink> EventSubscriber for SinkSubscriber<S> {
    fn on_event(&self, event: &SpyEvent) {
        let message = event.message();
        let level = event.level();
        if level == Level::ERROR {
            self.sink.error(&message);
        } else if level == Level::WARN {
            self.sink.warn(&message);
        } else {
            self.sink.info(&message);
        }
    }
}

/// A subscriber that collects events for later analysis.
pub struct CollectingSubscriber {
    events: RwLock<Vec<(Instant, SpyEvent)>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a new collecting subscriber.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<(Instant, SpyEvent)> {
        self.events.read().clone()
    }

    /// Get the collected event type names, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .iter()
            .map(|(_, event)| event.event_type())
            .collect()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &SpyEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push((Instant::now(), event.clone()));
        }
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn EventSubscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|existing| !Arc::ptr_eq(existing, subscriber));
        subscribers.len() != before
    }

    /// Check if a subscriber is subscribed.
    pub fn is_subscribed(&self, subscriber: &Arc<dyn EventSubscriber>) -> bool {
        self.subscribers
            .read()
            .iter()
            .any(|existing| Arc::ptr_eq(existing, subscriber))
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SpyEvent) {
        // Subscribers may subscribe or emit themselves.
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

static DEFAULT_LOGGER: LazyLock<Arc<dyn EventSubscriber>> =
    LazyLock::new(|| Arc::new(LoggingSubscriber::new()));

static DISPATCHER: LazyLock<EventDispatcher> = LazyLock::new(|| {
    let dispatcher = EventDispatcher::new();
    dispatcher.subscribe(Arc::clone(&DEFAULT_LOGGER));
    dispatcher
});

/// The [`LoggingSubscriber`] the process-wide dispatcher starts with.
pub fn default_logger() -> &'static Arc<dyn EventSubscriber> {
    &DEFAULT_LOGGER
}

/// The process-wide dispatcher all spy diagnostics go through.
pub fn dispatcher() -> &'static EventDispatcher {
    &DISPATCHER
}

/// Emit an event on the process-wide dispatcher.
pub fn emit(event: SpyEvent) {
    DISPATCHER.emit(event);
}
