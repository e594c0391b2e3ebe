//! Property decoration.
//!
//! [`decorate_property`] makes reads and writes of a single own property
//! visible in the activity log. A writable data property is replaced by a
//! synthetic getter/setter pair around a private value cell; an existing
//! accessor pair has each of its functions decorated with a `before` hook, so
//! the original accessor logic still runs.
//!
//! [`revert_decorated_property`] puts the property back the way it was.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use spyglass_core::{deep_clone, ObjectRef, PropertyDescriptor, Slot, Value, WeakObjectRef};
use spyglass_observe::{activity, emit, SpyEvent};
use tracing::debug;

use crate::config::DecoratorConfig;
use crate::error::{PropertyError, PropertyResult};
use crate::function::{decorate_callable, is_decorated_function, revert_decorated_function};
use crate::registry::accessors;

/// Reads and writes seen by one decorated property.
#[derive(Debug)]
struct AccessLog {
    object: WeakObjectRef,
    name: String,
    reads: AtomicU64,
    writes: Mutex<Vec<Value>>,
}

impl AccessLog {
    fn new(object: &ObjectRef, name: &str) -> Arc<Self> {
        Arc::new(Self {
            object: object.downgrade(),
            name: name.to_string(),
            reads: AtomicU64::new(0),
            writes: Mutex::new(Vec::new()),
        })
    }

    fn read(&self) {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(object) = self.object.upgrade() {
            activity::record_read(&object, &self.name, reads);
        }
    }

    fn write(&self, value: &Value) {
        let writes = {
            let mut writes = self.writes.lock();
            writes.push(deep_clone(value));
            writes.clone()
        };
        if let Some(object) = self.object.upgrade() {
            activity::record_write(&object, &self.name, &writes);
        }
    }
}

#[derive(Debug, Clone)]
enum AccessorKind {
    /// Installed over a plain data property.
    Synthetic {
        getter: ObjectRef,
        value: Arc<RwLock<Value>>,
    },
    /// Decorated an existing accessor pair.
    Wrapped {
        getter: Option<ObjectRef>,
        setter: Option<ObjectRef>,
    },
}

/// Handle to a decorated property.
///
/// `original_getter` and `original_setter` are both `None` when the property
/// was a plain data slot.
#[derive(Debug, Clone)]
pub struct AccessorRecord {
    /// The getter the property had before decoration.
    pub original_getter: Option<ObjectRef>,
    /// The setter the property had before decoration.
    pub original_setter: Option<ObjectRef>,
    kind: AccessorKind,
    log: Arc<AccessLog>,
}

impl AccessorRecord {
    /// Check if the property was a plain data slot.
    pub fn is_synthetic(&self) -> bool {
        matches!(self.kind, AccessorKind::Synthetic { .. })
    }

    /// Check if the decorated object still exists.
    pub fn is_alive(&self) -> bool {
        self.log.object.is_alive()
    }

    /// Number of reads since decoration.
    pub fn reads(&self) -> u64 {
        self.log.reads.load(Ordering::SeqCst)
    }

    /// Copies of every value written since decoration.
    pub fn writes(&self) -> Vec<Value> {
        self.log.writes.lock().clone()
    }

    /// The value currently held by a synthetic pair.
    pub fn current_value(&self) -> Option<Value> {
        match &self.kind {
            AccessorKind::Synthetic { value, .. } => Some(value.read().clone()),
            AccessorKind::Wrapped { .. } => None,
        }
    }
}

/// Decorate `object[name]` so its reads and writes are logged.
///
/// # Errors
///
/// Returns [`PropertyError`] when the property is missing, not configurable,
/// read-only or already decorated. The error is also reported as a
/// diagnostic event and the property is left untouched.
pub fn decorate_property(object: &ObjectRef, name: &str) -> PropertyResult<AccessorRecord> {
    let result = install(object, name);
    match &result {
        Ok(_) => debug!(object = %object.id(), property = name, "Decorated property"),
        Err(error) => emit(error.to_event()),
    }
    result
}

fn install(object: &ObjectRef, name: &str) -> PropertyResult<AccessorRecord> {
    let descriptor = object
        .get_own_property(name)
        .ok_or_else(|| PropertyError::Missing(name.to_string()))?;
    if accessors().contains(object.id(), name) {
        return Err(PropertyError::AlreadyDecorated(name.to_string()));
    }
    if !descriptor.configurable {
        return Err(PropertyError::NonConfigurable(name.to_string()));
    }

    let PropertyDescriptor {
        slot,
        enumerable,
        configurable,
    } = descriptor;
    let log = AccessLog::new(object, name);
    let record = match slot {
        Slot::Data {
            writable: false, ..
        } => return Err(PropertyError::ReadOnly(name.to_string())),
        Slot::Data { value, .. } => install_synthetic(object, name, value, enumerable, &log),
        Slot::Accessor { get, set } => {
            install_wrapped(object, name, (get, set), (enumerable, configurable), &log)
        }
    };

    accessors().register(object.id(), name, record.clone());
    Ok(record)
}

fn install_synthetic(
    object: &ObjectRef,
    name: &str,
    value: Value,
    enumerable: bool,
    log: &Arc<AccessLog>,
) -> AccessorRecord {
    let cell = Arc::new(RwLock::new(value));

    let getter = {
        let cell = Arc::clone(&cell);
        let log = Arc::clone(log);
        ObjectRef::function(move |_, _| {
            log.read();
            Ok(cell.read().clone())
        })
    };
    let setter = {
        let cell = Arc::clone(&cell);
        let log = Arc::clone(log);
        ObjectRef::function(move |_, args| {
            let value = args.first().cloned().unwrap_or_default();
            log.write(&value);
            *cell.write() = value;
            Ok(Value::Undefined)
        })
    };

    let descriptor = PropertyDescriptor::accessor(Some(getter.clone()), Some(setter))
        .with_enumerable(enumerable);
    // Configurability was checked by the caller.
    let _ = object.define_property(name, descriptor);

    AccessorRecord {
        original_getter: None,
        original_setter: None,
        kind: AccessorKind::Synthetic {
            getter,
            value: cell,
        },
        log: Arc::clone(log),
    }
}

fn install_wrapped(
    object: &ObjectRef,
    name: &str,
    (get, set): (Option<ObjectRef>, Option<ObjectRef>),
    (enumerable, configurable): (bool, bool),
    log: &Arc<AccessLog>,
) -> AccessorRecord {
    let getter = get.as_ref().and_then(|original| {
        let log = Arc::clone(log);
        let before = ObjectRef::function(move |_, _| {
            log.read();
            Ok(Value::Undefined)
        });
        decorate_callable(original, DecoratorConfig::new().with_before(before)).ok()
    });
    let setter = set.as_ref().and_then(|original| {
        let log = Arc::clone(log);
        let before = ObjectRef::function(move |_, args| {
            log.write(&args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        });
        decorate_callable(original, DecoratorConfig::new().with_before(before)).ok()
    });

    let descriptor = PropertyDescriptor::accessor(getter.clone(), setter.clone())
        .with_enumerable(enumerable)
        .with_configurable(configurable);
    let _ = object.define_property(name, descriptor);

    AccessorRecord {
        original_getter: get,
        original_setter: set,
        kind: AccessorKind::Wrapped { getter, setter },
        log: Arc::clone(log),
    }
}

/// Undo the decoration of `object[name]`.
///
/// A synthetic pair becomes a plain data property holding its last value,
/// unless the property was redefined in the meantime. A wrapped pair gets
/// its original getter and setter back. The activity log entry of the
/// property is deleted either way.
pub fn revert_decorated_property(object: &ObjectRef, name: &str) {
    let record = accessors().unregister(object.id(), name);
    let descriptor = object.get_own_property(name);

    match (record, descriptor) {
        (Some(record), Some(descriptor)) => match record.kind {
            AccessorKind::Synthetic { getter, value } => {
                let installed = descriptor.getter().is_some_and(|g| g.ptr_eq(&getter));
                if installed {
                    let value = value.read().clone();
                    let restored =
                        PropertyDescriptor::data(value).with_enumerable(descriptor.enumerable);
                    let _ = object.define_property(name, restored);
                } else {
                    emit(SpyEvent::RevertSkipped {
                        name: name.to_string(),
                        reason: "property was redefined".to_string(),
                    });
                }
            }
            AccessorKind::Wrapped { .. } => restore_accessors(object, name, descriptor),
        },
        (None, Some(descriptor)) if descriptor.is_accessor() => {
            restore_accessors(object, name, descriptor)
        }
        _ => {}
    }

    activity::delete_entry(object, name);
}

/// Replace decorated accessor functions on the descriptor by their originals.
fn restore_accessors(object: &ObjectRef, name: &str, descriptor: PropertyDescriptor) {
    let revert = |function: Option<&ObjectRef>| {
        function.map(|function| {
            if is_decorated_function(&Value::from(function)) {
                revert_decorated_function(function).unwrap_or_else(|| function.clone())
            } else {
                function.clone()
            }
        })
    };

    let get = revert(descriptor.getter());
    let set = revert(descriptor.setter());
    let restored = PropertyDescriptor {
        slot: Slot::Accessor { get, set },
        ..descriptor
    };
    if object.define_property(name, restored).is_err() {
        emit(SpyEvent::NonConfigurable {
            property: name.to_string(),
        });
    }
}
