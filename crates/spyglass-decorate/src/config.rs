//! Configuration for decorated callables.
//!
//! A decorated callable re-reads its configuration on every call, so hooks
//! can be attached or swapped after decoration through the shared
//! [`HookHandle`].

use std::sync::Arc;

use parking_lot::RwLock;
use spyglass_core::{ObjectRef, Value};

/// Property names used by the decoration machinery itself.
///
/// These are never copied from the original callable onto its decorated
/// counterpart, nor back.
pub const RESERVED_NAMES: [&str; 6] = ["calls", "before", "after", "callThrough", "fake", "_spy_"];

/// Check if a property name is reserved for the decoration machinery.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Configuration of a decorated callable.
///
/// Fields left unset fall back to the property of the same name on the
/// decorated callable, then on the original callable.
#[derive(Debug, Clone, Default)]
pub struct DecoratorConfig {
    /// Called with copies of the arguments before the primary call.
    pub before: Option<ObjectRef>,

    /// Called with a copy of the return value after the primary call.
    pub after: Option<ObjectRef>,

    /// Called in place of the original callable.
    pub fake: Option<ObjectRef>,

    /// Whether the primary call and hooks run at all.
    ///
    /// Defaults to `true`.
    pub call_through: Option<bool>,

    /// Receiver for the primary call and hooks.
    ///
    /// Defaults to the call-site receiver when it is an object, else the
    /// object the callable was decorated on.
    pub this_arg: Option<Value>,
}

impl DecoratorConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `before` hook.
    pub fn with_before(mut self, before: ObjectRef) -> Self {
        self.before = Some(before);
        self
    }

    /// Set the `after` hook.
    pub fn with_after(mut self, after: ObjectRef) -> Self {
        self.after = Some(after);
        self
    }

    /// Set the fake.
    pub fn with_fake(mut self, fake: ObjectRef) -> Self {
        self.fake = Some(fake);
        self
    }

    /// Enable or disable call-through.
    pub fn with_call_through(mut self, call_through: bool) -> Self {
        self.call_through = Some(call_through);
        self
    }

    /// Set an explicit receiver.
    pub fn with_this_arg(mut self, this_arg: impl Into<Value>) -> Self {
        self.this_arg = Some(this_arg.into());
        self
    }
}

/// Shared, mutable handle to a [`DecoratorConfig`].
#[derive(Debug, Clone, Default)]
pub struct HookHandle(Arc<RwLock<DecoratorConfig>>);

impl HookHandle {
    /// Wrap a configuration.
    pub fn new(config: DecoratorConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Copy out the current configuration.
    pub fn snapshot(&self) -> DecoratorConfig {
        self.0.read().clone()
    }

    /// Change the configuration in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut DecoratorConfig),
    {
        f(&mut self.0.write());
    }

    /// Replace the `before` hook.
    pub fn set_before(&self, before: Option<ObjectRef>) {
        self.update(|config| config.before = before);
    }

    /// Replace the `after` hook.
    pub fn set_after(&self, after: Option<ObjectRef>) {
        self.update(|config| config.after = after);
    }

    /// Replace the fake.
    pub fn set_fake(&self, fake: Option<ObjectRef>) {
        self.update(|config| config.fake = fake);
    }

    /// Replace the call-through flag.
    pub fn set_call_through(&self, call_through: bool) {
        self.update(|config| config.call_through = Some(call_through));
    }

    /// Check if two handles share the same configuration.
    pub fn ptr_eq(&self, other: &HookHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<DecoratorConfig> for HookHandle {
    fn from(config: DecoratorConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let hook = ObjectRef::function(|_, _| Ok(Value::Undefined));
        let config = DecoratorConfig::new()
            .with_before(hook.clone())
            .with_call_through(false)
            .with_this_arg(Value::Null);

        assert!(config.before.as_ref().unwrap().ptr_eq(&hook));
        assert!(config.after.is_none());
        assert_eq!(config.call_through, Some(false));
        assert_eq!(config.this_arg, Some(Value::Null));
    }

    #[test]
    fn test_handle_is_shared() {
        let handle = HookHandle::from(DecoratorConfig::new());
        let other = handle.clone();
        other.set_call_through(false);
        other.set_fake(Some(ObjectRef::function(|_, _| Ok(Value::from(1)))));

        let config = handle.snapshot();
        assert_eq!(config.call_through, Some(false));
        assert!(config.fake.is_some());
        assert!(handle.ptr_eq(&other));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("callThrough"));
        assert!(is_reserved("_spy_"));
        assert!(!is_reserved("helper"));
    }
}
