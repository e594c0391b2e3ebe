//! Chainable configuration of deployed spies.

use spyglass_core::{ObjectRef, Value};
use spyglass_observe::{emit, SpyEvent};
use tracing::debug;

use crate::spy::{Spy, SpyKind};

/// The spies deployed by one [`spy_on`](crate::spy_on) call.
///
/// Hooks attached here apply to every spy in the set:
///
/// ```ignore
/// spy_on(&object, "save")?
///     .and()
///     .call_before(log_arguments)
///     .call_fake(pretend_to_save);
/// ```
#[derive(Debug, Clone)]
pub struct SpyOnModule {
    object: ObjectRef,
    property: Option<String>,
    spies: Vec<Spy>,
}

impl SpyOnModule {
    pub(crate) fn new(object: ObjectRef, property: Option<String>, spies: Vec<Spy>) -> Self {
        Self {
            object,
            property,
            spies,
        }
    }

    /// Returns `self`, for readable chains.
    pub fn and(&self) -> &Self {
        self
    }

    /// Get the spied object.
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Get the spied property, if one was named.
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Get the deployed spies.
    pub fn spies(&self) -> &[Spy] {
        &self.spies
    }

    /// Get the number of deployed spies.
    pub fn len(&self) -> usize {
        self.spies.len()
    }

    /// Check if no spy was deployed.
    pub fn is_empty(&self) -> bool {
        self.spies.is_empty()
    }

    /// Call `hook` with copies of the arguments before each spied call.
    pub fn call_before(&self, hook: impl Into<Value>) -> &Self {
        self.attach("before", "callBefore", hook.into(), Spy::set_before)
    }

    /// Call `hook` with a copy of the return value after each spied call.
    pub fn call_after(&self, hook: impl Into<Value>) -> &Self {
        self.attach("after", "callAfter", hook.into(), Spy::set_after)
    }

    /// Call `hook` in place of the spied function.
    pub fn call_fake(&self, hook: impl Into<Value>) -> &Self {
        self.attach("fake", "callFake", hook.into(), Spy::set_fake)
    }

    /// Enable or disable call-through on every spy.
    pub fn call_through(&self, enabled: bool) -> &Self {
        if self.all_functions("callThrough") {
            for spy in &self.spies {
                spy.set_call_through(enabled);
            }
        }
        self
    }

    fn all_functions(&self, method: &'static str) -> bool {
        let functions = !self.spies.is_empty()
            && self
                .spies
                .iter()
                .all(|spy| spy.kind() == SpyKind::Callable);
        if !functions {
            emit(SpyEvent::InvalidHook {
                hook: method,
                reason: format!("{} can only be called on function spies", method),
            });
        }
        functions
    }

    fn attach(
        &self,
        hook: &'static str,
        method: &'static str,
        value: Value,
        apply: fn(&Spy, Option<ObjectRef>),
    ) -> &Self {
        if !self.all_functions(method) {
            return self;
        }
        let Some(callable) = value.as_callable() else {
            emit(SpyEvent::InvalidHook {
                hook,
                reason: format!("{} is not a function", value.type_of()),
            });
            return self;
        };

        for spy in &self.spies {
            apply(spy, Some(callable.clone()));
        }
        debug!(hook, spies = self.spies.len(), "Attached hook");
        self
    }
}
