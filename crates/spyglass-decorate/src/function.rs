//! Function decoration.
//!
//! [`decorate_function`] wraps a callable so every call is logged and can be
//! observed or replaced through `before`, `after` and `fake` hooks. A decorated
//! callable:
//!
//! 1. copies the arguments for the log,
//! 2. if call-through is disabled, logs the call with an `undefined` return
//!    and stops,
//! 3. runs `before` with copies of the arguments,
//! 4. runs the fake, or else the original, with the real arguments,
//! 5. runs `after` with a copy of the return value,
//! 6. appends `{ args, return }` to its `calls` list and to the activity log,
//! 7. returns the real return value.
//!
//! Each phase runs through [`guarded`], so an error in one phase is reported
//! and never aborts the others. When the primary call returns a pending value,
//! steps 5 and 6 wait for it to settle and the caller receives a pending value
//! that settles afterwards.
//!
//! [`revert_decorated_function`] undoes a decoration through the
//! [`DecorationRegistry`](crate::registry::DecorationRegistry).

use std::sync::Arc;

use parking_lot::Mutex;
use spyglass_core::{
    deep_clone, deep_clone_all, native_fn, CallResult, ObjectRef, Settlement, Slot, Value,
    WeakObjectRef,
};
use spyglass_observe::{activity, emit, CallRecord, HookPhase, SpyEvent};
use tracing::{debug, info, warn};

use crate::config::{is_reserved, DecoratorConfig, HookHandle};
use crate::error::{DecorateError, DecorateResult, HookError};
use crate::hook::{fail, guarded};
use crate::registry::{decorations, DecorationRecord};

/// What to decorate.
#[derive(Debug, Clone)]
pub enum DecorationTarget {
    /// The callable stored at `object[name]`; the decorated callable replaces it.
    Method {
        /// The object holding the callable.
        object: ObjectRef,
        /// The property name.
        name: String,
    },
    /// A callable on its own; the caller installs the result.
    Callable(ObjectRef),
}

impl From<ObjectRef> for DecorationTarget {
    fn from(callable: ObjectRef) -> Self {
        DecorationTarget::Callable(callable)
    }
}

impl From<&ObjectRef> for DecorationTarget {
    fn from(callable: &ObjectRef) -> Self {
        DecorationTarget::Callable(callable.clone())
    }
}

impl From<(&ObjectRef, &str)> for DecorationTarget {
    fn from((object, name): (&ObjectRef, &str)) -> Self {
        DecorationTarget::Method {
            object: object.clone(),
            name: name.to_string(),
        }
    }
}

/// Hooks in effect for one call.
struct ResolvedHooks {
    before: Option<ObjectRef>,
    after: Option<ObjectRef>,
    fake: Option<ObjectRef>,
    call_through: bool,
    this_arg: Option<Value>,
}

/// State shared by a decorated callable and its deferred continuations.
struct Decoration {
    original: ObjectRef,
    hooks: HookHandle,
    host: Option<WeakObjectRef>,
    name: String,
    calls: Mutex<Vec<CallRecord>>,
}

impl Decoration {
    fn resolve(&self, decorated: &ObjectRef) -> ResolvedHooks {
        let DecoratorConfig {
            before,
            after,
            fake,
            call_through,
            this_arg,
        } = self.hooks.snapshot();

        let own_hook = |key: &str| {
            own_callable(decorated, key).or_else(|| own_callable(&self.original, key))
        };
        let call_through = call_through
            .or_else(|| own_flag(decorated, "callThrough"))
            .or_else(|| own_flag(&self.original, "callThrough"))
            .unwrap_or(true);

        ResolvedHooks {
            before: before.or_else(|| own_hook("before")),
            after: after.or_else(|| own_hook("after")),
            fake: fake.or_else(|| own_hook("fake")),
            call_through,
            this_arg,
        }
    }

    fn receiver(&self, hooks: &ResolvedHooks, this: &Value) -> Value {
        if let Some(this_arg) = &hooks.this_arg {
            return this_arg.clone();
        }
        if matches!(this, Value::Object(_)) {
            return this.clone();
        }
        self.host
            .as_ref()
            .and_then(WeakObjectRef::upgrade)
            .map(Value::Object)
            .unwrap_or_default()
    }

    fn invoke(
        self: &Arc<Self>,
        decorated: ObjectRef,
        this: &Value,
        args: &[Value],
    ) -> CallResult<Value> {
        let hooks = self.resolve(&decorated);
        let logged_args = deep_clone_all(args);
        emit(SpyEvent::FunctionCalled {
            name: self.name.clone(),
            call_through: hooks.call_through,
        });

        if !hooks.call_through {
            self.log(&decorated, CallRecord::new(logged_args, Value::Undefined));
            return Ok(Value::Undefined);
        }

        let receiver = self.receiver(&hooks, this);

        if let Some(before) = &hooks.before {
            let _ = guarded(HookPhase::Before, &self.name, || {
                before.call(&receiver, &deep_clone_all(args))
            });
        }

        let primary = hooks.fake.as_ref().unwrap_or(&self.original);
        let outcome = guarded(HookPhase::Primary, &self.name, || primary.call(&receiver, args));

        match outcome {
            Ok(Value::Pending(pending)) => {
                let decoration = Arc::clone(self);
                let after = hooks.after;
                let chained = pending.then(move |settlement| {
                    let outcome = match settlement {
                        Settlement::Fulfilled(value) => Ok(value.clone()),
                        Settlement::Rejected(error) => {
                            Err(fail(HookPhase::Primary, &decoration.name, error.message.clone()))
                        }
                    };
                    decoration.finish(&decorated, &receiver, after.as_ref(), logged_args, &outcome);
                });
                Ok(Value::Pending(chained))
            }
            outcome => {
                self.finish(&decorated, &receiver, hooks.after.as_ref(), logged_args, &outcome);
                Ok(outcome.unwrap_or_default())
            }
        }
    }

    /// Run `after` and log the call.
    fn finish(
        &self,
        decorated: &ObjectRef,
        receiver: &Value,
        after: Option<&ObjectRef>,
        logged_args: Vec<Value>,
        outcome: &Result<Value, HookError>,
    ) {
        let returned = outcome.as_ref().cloned().unwrap_or_default();

        if let Some(after) = after {
            let _ = guarded(HookPhase::After, &self.name, || {
                after.call(receiver, &[deep_clone(&returned)])
            });
        }

        let logged_return = match outcome {
            Ok(value) => deep_clone(value),
            Err(error) => Value::from(error.return_marker()),
        };
        self.log(decorated, CallRecord::new(logged_args, logged_return));
    }

    fn log(&self, decorated: &ObjectRef, record: CallRecord) {
        let calls = {
            let mut calls = self.calls.lock();
            calls.push(record);
            calls.clone()
        };

        // Once reverted, the host's log is no longer ours to write.
        let host = self
            .host
            .as_ref()
            .filter(|_| decorations().contains(decorated.id()))
            .and_then(WeakObjectRef::upgrade);
        let host = host.as_ref().map(|host| (host, self.name.as_str()));
        activity::record_call(decorated, host, &calls);
    }
}

fn own_value(object: &ObjectRef, key: &str) -> Option<Value> {
    object
        .get_own_property(key)
        .and_then(|descriptor| descriptor.value().cloned())
}

fn own_callable(object: &ObjectRef, key: &str) -> Option<ObjectRef> {
    own_value(object, key).and_then(|value| value.as_callable().cloned())
}

fn own_flag(object: &ObjectRef, key: &str) -> Option<bool> {
    own_value(object, key).and_then(|value| value.as_bool())
}

/// Decorate a callable.
///
/// For [`DecorationTarget::Method`] the decorated callable is assigned back to
/// `object[name]`; for [`DecorationTarget::Callable`] it is only returned.
///
/// Enumerable own properties of the original are copied onto the decorated
/// callable, except for reserved names.
///
/// # Errors
///
/// Returns [`DecorateError`] if the named property is missing, does not hold
/// a callable, or cannot be assigned.
pub fn decorate_function(
    target: impl Into<DecorationTarget>,
    config: impl Into<HookHandle>,
) -> DecorateResult<ObjectRef> {
    let hooks = config.into();
    let (original, host, name) = match target.into() {
        DecorationTarget::Method { object, name } => {
            let descriptor = object
                .get_own_property(&name)
                .ok_or_else(|| DecorateError::MissingProperty(name.clone()))?;
            if matches!(descriptor.slot, Slot::Data { writable: false, .. }) {
                return Err(DecorateError::ReadOnly(name));
            }
            let value = object
                .get(&name)
                .map_err(|e| DecorateError::InstallFailed {
                    name: name.clone(),
                    reason: e.message,
                })?;
            let original = value
                .as_callable()
                .cloned()
                .ok_or_else(|| DecorateError::NotCallable(name.clone()))?;
            (original, Some(object), name)
        }
        DecorationTarget::Callable(callable) => {
            if !callable.is_callable() {
                return Err(DecorateError::NotCallable(callable.id().to_string()));
            }
            (callable, None, String::new())
        }
    };

    let decoration = Arc::new(Decoration {
        original: original.clone(),
        hooks,
        host: host.as_ref().map(ObjectRef::downgrade),
        name: name.clone(),
        calls: Mutex::new(Vec::new()),
    });

    let decorated = ObjectRef::function_cyclic(|me| {
        native_fn(move |this, args| match me.upgrade() {
            Some(decorated) => decoration.invoke(decorated, this, args),
            None => decoration.original.call(this, args),
        })
    });

    let mut snapshot = Vec::new();
    for key in original.keys() {
        if is_reserved(&key) {
            continue;
        }
        let value = original.get(&key).unwrap_or_default();
        decorated.insert(key.clone(), value.clone());
        snapshot.push((key, value));
    }

    if let Some(host) = &host {
        host.set(&name, decorated.clone())
            .map_err(|e| DecorateError::InstallFailed {
                name: name.clone(),
                reason: e.message,
            })?;
    }

    decorations().register(
        decorated.id(),
        DecorationRecord {
            original,
            host: host.as_ref().map(ObjectRef::downgrade),
            name: host.as_ref().map(|_| name.clone()),
            decorated: decorated.downgrade(),
            snapshot,
        },
    );

    debug!(name = %name, decorated = %decorated.id(), "Decorated function");
    Ok(decorated)
}

/// Decorate the callable stored at `object[name]` and install the result there.
pub fn decorate_method(
    object: &ObjectRef,
    name: &str,
    config: impl Into<HookHandle>,
) -> DecorateResult<ObjectRef> {
    decorate_function((object, name), config)
}

/// Decorate a callable without installing it anywhere.
pub fn decorate_callable(
    callable: &ObjectRef,
    config: impl Into<HookHandle>,
) -> DecorateResult<ObjectRef> {
    decorate_function(callable, config)
}

/// Check if a value is a decorated callable that has not been reverted.
pub fn is_decorated_function(value: &Value) -> bool {
    value
        .as_callable()
        .is_some_and(|callable| decorations().contains(callable.id()))
}

/// Get the original behind a decorated callable without reverting it.
pub fn original_function(decorated: &ObjectRef) -> Option<ObjectRef> {
    decorations()
        .lookup(decorated.id())
        .map(|record| record.original)
}

/// Undo a decoration and return the original callable.
///
/// Properties added to or changed on the decorated callable since decoration
/// are applied to the original. The original is put back on its host only if
/// the host still holds this decorated callable; a slot that was reassigned
/// in the meantime keeps its new value. The registry entry and the decorated
/// callable's `calls` list are removed either way; a stale handle to the
/// decorated callable keeps working but no longer writes to the host's log.
///
/// Returns `None` for a callable that is not decorated.
pub fn revert_decorated_function(decorated: &ObjectRef) -> Option<ObjectRef> {
    let Some(record) = decorations().unregister(decorated.id()) else {
        emit(SpyEvent::NotDecorated {
            name: decorated.id().to_string(),
        });
        return None;
    };

    for key in decorated.keys() {
        if is_reserved(&key) {
            continue;
        }
        let Some(value) = own_value(decorated, &key) else {
            continue;
        };
        let unchanged = record
            .snapshot_value(&key)
            .is_some_and(|before| before.same_value(&value));
        if unchanged {
            continue;
        }
        if let Err(e) = record.original.set(&key, value) {
            warn!(property = %key, error = %e.message, "Could not carry property back to original");
        }
    }
    activity::clear_calls(decorated);

    match (record.host(), record.name.as_deref()) {
        (Some((host, name)), _) => {
            let current = own_value(&host, name);
            let installed = current
                .as_ref()
                .and_then(Value::as_object)
                .is_some_and(|current| current.ptr_eq(decorated));
            if installed {
                if let Err(e) = host.set(name, record.original.clone()) {
                    emit(SpyEvent::RevertSkipped {
                        name: name.to_string(),
                        reason: e.message,
                    });
                }
                activity::delete_entry(&host, name);
                info!(name = %name, "Reverted decorated function");
            } else {
                emit(SpyEvent::RevertSkipped {
                    name: name.to_string(),
                    reason: "property no longer holds the decorated function".to_string(),
                });
            }
        }
        (None, Some(name)) => {
            emit(SpyEvent::RevertSkipped {
                name: name.to_string(),
                reason: "object holding the decorated function no longer exists".to_string(),
            });
        }
        (None, None) => {
            debug!(decorated = %decorated.id(), "Reverted directly decorated function");
        }
    }

    Some(record.original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spyglass_core::{Exception, Pending, PropertyDescriptor};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Callable that counts its calls and returns `result`.
    fn counting(result: Value) -> (ObjectRef, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let function = ObjectRef::function(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(result.clone())
        });
        (function, count)
    }

    /// Callable that appends `label` to a shared journal.
    fn journaled(label: &'static str, journal: &Arc<Mutex<Vec<&'static str>>>) -> ObjectRef {
        let journal = Arc::clone(journal);
        ObjectRef::function(move |_, _| {
            journal.lock().push(label);
            Ok(Value::from("failure"))
        })
    }

    fn sum() -> ObjectRef {
        ObjectRef::function(|_, args| {
            let a = args.first().cloned().unwrap_or_default();
            let b = args.get(1).cloned().unwrap_or_default();
            match (a.as_number(), b.as_number()) {
                (Some(a), Some(b)) => Ok(Value::from(a + b)),
                _ => Ok(Value::from(format!("{}{}", a, b))),
            }
        })
    }

    fn calls_json(decorated: &ObjectRef) -> serde_json::Value {
        decorated.get("calls").unwrap().to_json()
    }

    #[test]
    fn test_decorate_method_installs_and_calls_through() {
        let (original, count) = counting(Value::Undefined);
        let context = ObjectRef::new().with("toBeDecorated", original.clone());

        let decorated = decorate_method(&context, "toBeDecorated", DecoratorConfig::new()).unwrap();
        assert!(!decorated.ptr_eq(&original));
        assert_eq!(context.get("toBeDecorated").unwrap(), Value::from(&decorated));

        context.invoke("toBeDecorated", &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_decorate_callable_passes_arguments() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let original = ObjectRef::function(move |_, args| {
            sink.lock().extend(args.iter().cloned());
            Ok(Value::Undefined)
        });
        let list = Value::array(vec![Value::from("arg3")]);

        let decorated = decorate_callable(&original, DecoratorConfig::new()).unwrap();
        decorated
            .call(
                &Value::Undefined,
                &[Value::from("arg1"), Value::from("arg2"), list.clone()],
            )
            .unwrap();

        let received = received.lock();
        assert_eq!(received[0], Value::from("arg1"));
        // The original sees the caller's values, not copies.
        assert_eq!(received[2], list);
        assert!(is_decorated_function(&Value::from(&decorated)));
        assert!(!is_decorated_function(&Value::from(&original)));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_call_through_disabled() {
        let (original, count) = counting(Value::from(1));
        let context = ObjectRef::new().with("f", original);
        let decorated =
            decorate_method(&context, "f", DecoratorConfig::new().with_call_through(false)).unwrap();

        assert!(context.invoke("f", &[Value::from(7)]).unwrap().is_undefined());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(calls_json(&decorated), json!([{"args": [7], "return": null}]));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_hook_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let context = ObjectRef::new().with("f", journaled("original", &journal));
        let config = DecoratorConfig::new()
            .with_before(journaled("before", &journal))
            .with_after(journaled("after", &journal));
        let decorated = decorate_method(&context, "f", config).unwrap();

        // Hook returns are ignored.
        assert_eq!(context.invoke("f", &[]).unwrap(), Value::from("failure"));
        assert_eq!(journal.lock().as_slice(), &["before", "original", "after"]);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_hooks_share_the_receiver() {
        let (helper, count) = counting(Value::Undefined);
        let (original, _) = counting(Value::Undefined);
        let context = ObjectRef::new()
            .with("toBeDecorated", original)
            .with("toBeCalledByBeforeAfter", helper);
        let before = ObjectRef::function(|this, _| {
            this.as_object().unwrap().invoke("toBeCalledByBeforeAfter", &[])
        });
        let after = before.clone();
        let config = DecoratorConfig::new().with_before(before).with_after(after);
        let decorated = decorate_method(&context, "toBeDecorated", config).unwrap();

        context.invoke("toBeDecorated", &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_failing_before_does_not_stop_the_call() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let context = ObjectRef::new().with("f", journaled("original", &journal));
        let before = ObjectRef::function(|_, _| Err(Exception::new("throwing a test error")));
        let config = DecoratorConfig::new()
            .with_before(before)
            .with_after(journaled("after", &journal));
        let decorated = decorate_method(&context, "f", config).unwrap();

        context.invoke("f", &[]).unwrap();
        assert_eq!(journal.lock().as_slice(), &["original", "after"]);
        assert_eq!(decorated.get("calls").unwrap().as_array().unwrap().len(), 1);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_failing_primary_logs_marker() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let original = ObjectRef::function(|_, _| Err(Exception::new("broken")));
        let context = ObjectRef::new().with("f", original);
        let after_journal = Arc::clone(&journal);
        let after = ObjectRef::function(move |_, args| {
            after_journal.lock().push(args[0].is_undefined());
            Ok(Value::Undefined)
        });
        let decorated = decorate_method(&context, "f", DecoratorConfig::new().with_after(after)).unwrap();

        assert!(context.invoke("f", &[Value::from(1)]).unwrap().is_undefined());
        assert_eq!(journal.lock().as_slice(), &[true]);
        assert_eq!(
            calls_json(&decorated),
            json!([{"args": [1], "return": "Error: broken"}])
        );
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_fake_replaces_original() {
        let (original, count) = counting(Value::from("real"));
        let (fake, _) = counting(Value::from("fake"));
        let context = ObjectRef::new().with("f", original);
        let decorated = decorate_method(&context, "f", DecoratorConfig::new().with_fake(fake)).unwrap();

        assert_eq!(context.invoke("f", &[]).unwrap(), Value::from("fake"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_call_log_matches_calls() {
        let context = ObjectRef::new().with("sum", sum());
        let decorated = decorate_method(&context, "sum", DecoratorConfig::new()).unwrap();
        assert!(!decorated.has_own_property("calls"));

        assert_eq!(context.invoke("sum", &[Value::from(1), Value::from(1)]).unwrap(), Value::from(2));
        assert_eq!(
            context.invoke("sum", &[Value::from(5), Value::from("6")]).unwrap(),
            Value::from("56")
        );

        let expected = json!([
            {"args": [1, 1], "return": 2},
            {"args": [5, "6"], "return": "56"},
        ]);
        assert_eq!(calls_json(&decorated), expected);
        let spy_log = context.get("_spy_").unwrap().to_json();
        assert_eq!(spy_log, json!({"sum": {"calls": expected}}));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_logged_arguments_are_copies() {
        let context = ObjectRef::new().with("sum", sum());
        let decorated = decorate_method(&context, "sum", DecoratorConfig::new()).unwrap();
        let argument = Value::from(json!({"a": 1}));

        context.invoke("sum", &[Value::from(1), argument.clone()]).unwrap();
        argument.as_object().unwrap().set("a", 3).unwrap();

        assert_eq!(
            calls_json(&decorated),
            json!([{"args": [1, {"a": 1}], "return": "1[object Object]"}])
        );
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_call_log_resists_tampering() {
        let context = ObjectRef::new().with("sum", sum());
        let decorated = decorate_method(&context, "sum", DecoratorConfig::new()).unwrap();

        context.invoke("sum", &[Value::from(1), Value::from(2)]).unwrap();
        let calls = decorated.get("calls").unwrap();
        let first = calls.as_array().unwrap().get(0);
        first.as_object().unwrap().insert("args", Value::from(json!([9, 9])));
        context.invoke("sum", &[Value::from(1), Value::from(2)]).unwrap();

        let calls = decorated.get("calls").unwrap();
        let first = calls.as_array().unwrap().get(0);
        assert_eq!(first.to_json(), json!({"args": [1, 2], "return": 3}));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_revert_restores_original() {
        let (original, count) = counting(Value::Undefined);
        let (before, before_count) = counting(Value::Undefined);
        let context = ObjectRef::new().with("f", original.clone());
        let decorated = decorate_method(&context, "f", DecoratorConfig::new().with_before(before)).unwrap();
        context.invoke("f", &[]).unwrap();

        let reverted = revert_decorated_function(&decorated).unwrap();
        assert!(reverted.ptr_eq(&original));
        assert_eq!(context.get("f").unwrap(), Value::from(&original));
        assert!(!context.has_own_property("_spy_"));
        assert!(!original.has_own_property("calls"));

        context.invoke("f", &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(before_count.load(Ordering::SeqCst), 1);
        assert!(!is_decorated_function(&Value::from(&decorated)));
    }

    #[test]
    fn test_revert_keeps_reassigned_slot() {
        let (original, _) = counting(Value::Undefined);
        let context = ObjectRef::new().with("f", original.clone());
        let decorated = decorate_method(&context, "f", DecoratorConfig::new()).unwrap();
        context.set("f", "some other value").unwrap();

        let reverted = revert_decorated_function(&decorated).unwrap();
        assert!(reverted.ptr_eq(&original));
        assert_eq!(context.get("f").unwrap(), Value::from("some other value"));
        assert!(!is_decorated_function(&Value::from(&decorated)));
    }

    #[test]
    fn test_revert_with_host_gone() {
        let (original, _) = counting(Value::Undefined);
        let context = ObjectRef::new().with("f", original.clone());
        let decorated = decorate_method(&context, "f", DecoratorConfig::new()).unwrap();
        drop(context);

        let reverted = revert_decorated_function(&decorated).unwrap();
        assert!(reverted.ptr_eq(&original));
    }

    #[test]
    fn test_revert_unregistered_is_noop() {
        let (plain, _) = counting(Value::Undefined);
        assert!(revert_decorated_function(&plain).is_none());
    }

    #[test]
    fn test_custom_properties_are_copied_and_returned() {
        let (original, _) = counting(Value::Undefined);
        original.insert("helper", 1);
        original.insert("calls", "reserved");
        let context = ObjectRef::new().with("f", original.clone());
        let decorated = decorate_method(&context, "f", DecoratorConfig::new()).unwrap();

        assert_eq!(decorated.get("helper").unwrap(), Value::from(1));
        assert!(!decorated.has_own_property("calls"));

        decorated.set("helper", 2).unwrap();
        decorated.set("added", true).unwrap();
        revert_decorated_function(&decorated);

        assert_eq!(original.get("helper").unwrap(), Value::from(2));
        assert_eq!(original.get("added").unwrap(), Value::Bool(true));
        assert_eq!(original.get("calls").unwrap(), Value::from("reserved"));
    }

    #[test]
    fn test_carry_back_keeps_original_descriptors() {
        let (original, _) = counting(Value::Undefined);
        let stored = Arc::new(Mutex::new(Value::from(1)));
        let (read, write) = (Arc::clone(&stored), Arc::clone(&stored));
        original
            .define_property(
                "size",
                PropertyDescriptor::accessor(
                    Some(ObjectRef::function(move |_, _| Ok(read.lock().clone()))),
                    Some(ObjectRef::function(move |_, args| {
                        *write.lock() = args.first().cloned().unwrap_or_default();
                        Ok(Value::Undefined)
                    })),
                ),
            )
            .unwrap();
        original
            .define_property("fixed", PropertyDescriptor::data(1).with_writable(false))
            .unwrap();
        original.insert("ratio", f64::NAN);

        let decorated = decorate_callable(&original, DecoratorConfig::new()).unwrap();
        decorated.set("size", 5).unwrap();
        decorated.set("fixed", 2).unwrap();
        revert_decorated_function(&decorated);

        // The setter ran; the accessor is still an accessor.
        assert_eq!(*stored.lock(), Value::from(5));
        assert!(original.get_own_property("size").unwrap().setter().is_some());
        assert_eq!(original.get("fixed").unwrap(), Value::from(1));
        assert!(!original.get_own_property("fixed").unwrap().is_writable());
        assert!(original.get("ratio").unwrap().same_value(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_stale_handle_after_revert_leaves_host_log_alone() {
        let (original, count) = counting(Value::from(1));
        let context = ObjectRef::new().with("f", original);
        let decorated = decorate_method(&context, "f", DecoratorConfig::new()).unwrap();
        decorated.call(&Value::from(&context), &[]).unwrap();
        revert_decorated_function(&decorated);
        assert!(!context.has_own_property("_spy_"));
        assert!(!decorated.has_own_property("calls"));

        assert_eq!(decorated.call(&Value::from(&context), &[]).unwrap(), Value::from(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!context.has_own_property("_spy_"));
    }

    #[test]
    fn test_pending_settled_after_revert_leaves_host_log_alone() {
        let pending = Pending::new();
        let returned = pending.clone();
        let original = ObjectRef::function(move |_, _| Ok(Value::Pending(returned.clone())));
        let context = ObjectRef::new().with("load", original);
        let decorated = decorate_method(&context, "load", DecoratorConfig::new()).unwrap();

        let result = context.invoke("load", &[]).unwrap();
        revert_decorated_function(&decorated);
        pending.resolve(5);

        assert!(!context.has_own_property("_spy_"));
        let settled = result.as_pending().unwrap().settlement().unwrap();
        assert_eq!(settled.value(), Some(&Value::from(5)));
    }

    #[test]
    fn test_configuration_on_the_original() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let original = journaled("original", &journal);
        original.insert("before", journaled("before", &journal));

        let decorated = decorate_callable(&original, DecoratorConfig::new()).unwrap();
        decorated.call(&Value::Undefined, &[]).unwrap();
        assert_eq!(journal.lock().as_slice(), &["before", "original"]);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_configuration_is_reread_per_call() {
        let (original, count) = counting(Value::Undefined);
        let hooks = HookHandle::new(DecoratorConfig::new());
        let decorated = decorate_callable(&original, hooks.clone()).unwrap();

        decorated.call(&Value::Undefined, &[]).unwrap();
        hooks.set_call_through(false);
        decorated.call(&Value::Undefined, &[]).unwrap();
        decorated.insert("callThrough", true);
        decorated.call(&Value::Undefined, &[]).unwrap();

        // The handle wins over the property.
        assert_eq!(count.load(Ordering::SeqCst), 1);

        hooks.update(|config| config.call_through = None);
        decorated.call(&Value::Undefined, &[]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_pending_result_logs_after_settlement() {
        let pending = Pending::new();
        let returned = pending.clone();
        let original = ObjectRef::function(move |_, _| Ok(Value::Pending(returned.clone())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let after = ObjectRef::function(move |_, args| {
            sink.lock().push(args[0].clone());
            Ok(Value::Undefined)
        });
        let context = ObjectRef::new().with("load", original);
        let decorated = decorate_method(&context, "load", DecoratorConfig::new().with_after(after)).unwrap();

        let result = context.invoke("load", &[Value::from("id")]).unwrap();
        let chained = result.as_pending().unwrap().clone();
        assert!(!chained.ptr_eq(&pending));
        assert!(!decorated.has_own_property("calls"));
        assert!(seen.lock().is_empty());

        pending.resolve("loaded");
        assert_eq!(seen.lock().as_slice(), &[Value::from("loaded")]);
        assert_eq!(calls_json(&decorated), json!([{"args": ["id"], "return": "loaded"}]));
        assert_eq!(chained.settlement().unwrap().value(), Some(&Value::from("loaded")));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_rejected_pending_result() {
        let original = ObjectRef::function(|_, _| Ok(Value::Pending(Pending::rejected(Exception::new("offline")))));
        let decorated = decorate_callable(&original, DecoratorConfig::new()).unwrap();

        let result = decorated.call(&Value::Undefined, &[]).unwrap();
        let settlement = result.as_pending().unwrap().settlement().unwrap();
        assert_eq!(settlement.error().unwrap().message, "offline");
        assert_eq!(calls_json(&decorated), json!([{"args": [], "return": "Error: offline"}]));
        revert_decorated_function(&decorated);
    }

    #[test]
    fn test_missing_and_non_callable_targets() {
        let context = ObjectRef::new().with("value", 1);
        assert!(matches!(
            decorate_method(&context, "missing", DecoratorConfig::new()),
            Err(DecorateError::MissingProperty(_))
        ));
        assert!(matches!(
            decorate_method(&context, "value", DecoratorConfig::new()),
            Err(DecorateError::NotCallable(_))
        ));
        assert!(matches!(
            decorate_callable(&ObjectRef::new(), DecoratorConfig::new()),
            Err(DecorateError::NotCallable(_))
        ));
    }

    #[test]
    fn test_this_defaults_to_host_for_detached_calls() {
        let context = ObjectRef::new().with("name", "host");
        context.insert(
            "whoami",
            ObjectRef::function(|this, _| match this.as_object() {
                Some(object) => object.get("name"),
                None => Ok(Value::Undefined),
            }),
        );
        let decorated = decorate_method(&context, "whoami", DecoratorConfig::new()).unwrap();

        let detached = decorated.call(&Value::Undefined, &[]).unwrap();
        assert_eq!(detached, Value::from("host"));

        let other = ObjectRef::new().with("name", "other");
        assert_eq!(decorated.call(&Value::from(&other), &[]).unwrap(), Value::from("other"));

        let pinned = decorate_callable(&decorated, DecoratorConfig::new().with_this_arg(&other)).unwrap();
        assert_eq!(pinned.call(&Value::from(&context), &[]).unwrap(), Value::from("other"));

        revert_decorated_function(&pinned);
        revert_decorated_function(&decorated);
    }
}
