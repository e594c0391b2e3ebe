//! Objects, property descriptors and callables.
//!
//! An [`ObjectRef`] is a shared handle to an object with a stable
//! [`ObjectId`], an insertion-ordered table of own properties and, for
//! callables, a native call behavior. Properties are either data slots or
//! accessor pairs, described by a [`PropertyDescriptor`].
//!
//! No lock is held while a getter, setter or callable runs, so user code is
//! free to re-enter the object it was invoked on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{CallResult, Exception, ObjectError, ObjectResult};
use crate::value::Value;

/// Native call behavior: `(this, args) -> result`.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> CallResult<Value> + Send + Sync>;

/// Box a closure as a [`NativeFn`].
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&Value, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Stable identifier for an object.
///
/// Registries key on this instead of on the object itself so they never keep
/// an unrelated object alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage of a property.
#[derive(Clone, Debug)]
pub enum Slot {
    /// A plain value.
    Data {
        /// The stored value.
        value: Value,
        /// Whether assignment changes the value.
        writable: bool,
    },
    /// A getter/setter pair.
    Accessor {
        /// Called on read.
        get: Option<ObjectRef>,
        /// Called on write.
        set: Option<ObjectRef>,
    },
}

/// Full description of an own property.
#[derive(Clone, Debug)]
pub struct PropertyDescriptor {
    /// Value or accessor pair.
    pub slot: Slot,
    /// Whether the property shows up in [`ObjectRef::keys`].
    pub enumerable: bool,
    /// Whether the property may be redefined or deleted.
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// An ordinary writable, enumerable, configurable data property.
    pub fn data(value: impl Into<Value>) -> Self {
        Self {
            slot: Slot::Data {
                value: value.into(),
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// An enumerable, configurable accessor property.
    pub fn accessor(get: Option<ObjectRef>, set: Option<ObjectRef>) -> Self {
        Self {
            slot: Slot::Accessor { get, set },
            enumerable: true,
            configurable: true,
        }
    }

    /// Set enumerability.
    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    /// Set configurability.
    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = configurable;
        self
    }

    /// Set writability. Has no effect on accessor properties.
    pub fn with_writable(mut self, writable: bool) -> Self {
        if let Slot::Data { writable: w, .. } = &mut self.slot {
            *w = writable;
        }
        self
    }

    /// The stored value of a data property.
    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            Slot::Data { value, .. } => Some(value),
            Slot::Accessor { .. } => None,
        }
    }

    /// The getter of an accessor property.
    pub fn getter(&self) -> Option<&ObjectRef> {
        match &self.slot {
            Slot::Accessor { get, .. } => get.as_ref(),
            Slot::Data { .. } => None,
        }
    }

    /// The setter of an accessor property.
    pub fn setter(&self) -> Option<&ObjectRef> {
        match &self.slot {
            Slot::Accessor { set, .. } => set.as_ref(),
            Slot::Data { .. } => None,
        }
    }

    /// Check if this is an accessor property.
    pub fn is_accessor(&self) -> bool {
        matches!(self.slot, Slot::Accessor { .. })
    }

    /// Check if this is a writable data property.
    pub fn is_writable(&self) -> bool {
        matches!(self.slot, Slot::Data { writable: true, .. })
    }
}

struct ObjectData {
    id: ObjectId,
    call: Option<NativeFn>,
    properties: RwLock<IndexMap<String, PropertyDescriptor>>,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectData>);

/// Non-owning handle to an object.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectData>);

impl WeakObjectRef {
    /// Get the object back if it still exists.
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    /// Check if the object still exists.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRef {
    fn from_parts(call: Option<NativeFn>) -> Self {
        Self(Arc::new(ObjectData {
            id: ObjectId::next(),
            call,
            properties: RwLock::new(IndexMap::new()),
        }))
    }

    /// Create an empty plain object.
    pub fn new() -> Self {
        Self::from_parts(None)
    }

    /// Create a callable object from a native closure.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
    {
        Self::from_parts(Some(native_fn(f)))
    }

    /// Create a callable object whose behavior refers back to the object.
    ///
    /// `build` receives a weak handle to the object being created.
    pub fn function_cyclic<B>(build: B) -> Self
    where
        B: FnOnce(WeakObjectRef) -> NativeFn,
    {
        Self(Arc::new_cyclic(|weak| ObjectData {
            id: ObjectId::next(),
            call: Some(build(WeakObjectRef(weak.clone()))),
            properties: RwLock::new(IndexMap::new()),
        }))
    }

    /// Builder-style insertion of a data property.
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get the stable id.
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Check if the object can be called.
    pub fn is_callable(&self) -> bool {
        self.0.call.is_some()
    }

    /// Check if two handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Get a copy of an own property's descriptor.
    pub fn get_own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        self.0.properties.read().get(name).cloned()
    }

    /// Check if an own property exists.
    pub fn has_own_property(&self, name: &str) -> bool {
        self.0.properties.read().contains_key(name)
    }

    /// Define or redefine an own property.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::NonConfigurable`] if the property exists and is
    /// not configurable.
    pub fn define_property(
        &self,
        name: impl Into<String>,
        descriptor: PropertyDescriptor,
    ) -> ObjectResult<()> {
        let name = name.into();
        let mut properties = self.0.properties.write();
        if let Some(existing) = properties.get(&name) {
            if !existing.configurable {
                return Err(ObjectError::NonConfigurable(name));
            }
        }
        properties.insert(name, descriptor);
        Ok(())
    }

    /// Define an ordinary data property, replacing any configurable property
    /// of the same name without invoking its setter.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) {
        // A non-configurable property keeps its definition.
        let _ = self.define_property(name, PropertyDescriptor::data(value));
    }

    /// Read a property, invoking its getter if it has one.
    ///
    /// Missing properties read as `undefined`.
    pub fn get(&self, name: &str) -> CallResult<Value> {
        let slot = self.0.properties.read().get(name).map(|p| p.slot.clone());
        match slot {
            Some(Slot::Data { value, .. }) => Ok(value),
            Some(Slot::Accessor {
                get: Some(getter), ..
            }) => getter.call(&Value::Object(self.clone()), &[]),
            _ => Ok(Value::Undefined),
        }
    }

    /// Assign a property, invoking its setter if it has one.
    ///
    /// Assigning a read-only data property, or an accessor without setter, is
    /// ignored. Assigning a missing property creates an ordinary data
    /// property.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> CallResult<()> {
        let value = value.into();
        let setter = {
            let mut properties = self.0.properties.write();
            match properties.get_mut(name) {
                Some(PropertyDescriptor {
                    slot: Slot::Data {
                        value: current,
                        writable,
                    },
                    ..
                }) => {
                    if *writable {
                        *current = value;
                    }
                    return Ok(());
                }
                Some(PropertyDescriptor {
                    slot: Slot::Accessor { set, .. },
                    ..
                }) => set.clone(),
                None => {
                    properties.insert(name.to_string(), PropertyDescriptor::data(value));
                    return Ok(());
                }
            }
        };

        match setter {
            Some(setter) => setter
                .call(&Value::Object(self.clone()), &[value])
                .map(|_| ()),
            None => Ok(()),
        }
    }

    /// Delete an own property.
    ///
    /// Returns `false` if the property exists and is not configurable.
    pub fn delete(&self, name: &str) -> bool {
        let mut properties = self.0.properties.write();
        match properties.get(name) {
            Some(descriptor) if !descriptor.configurable => false,
            Some(_) => {
                properties.shift_remove(name);
                true
            }
            None => true,
        }
    }

    /// Names of enumerable own properties, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0
            .properties
            .read()
            .iter()
            .filter(|(_, descriptor)| descriptor.enumerable)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of all own properties, in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        self.0.properties.read().keys().cloned().collect()
    }

    /// Enumerable own properties with their descriptors, in insertion order.
    pub fn entries(&self) -> Vec<(String, PropertyDescriptor)> {
        self.0
            .properties
            .read()
            .iter()
            .filter(|(_, descriptor)| descriptor.enumerable)
            .map(|(name, descriptor)| (name.clone(), descriptor.clone()))
            .collect()
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.0.properties.read().len()
    }

    /// Check if the object has no own properties.
    pub fn is_empty(&self) -> bool {
        self.0.properties.read().is_empty()
    }

    /// Call the object with an explicit receiver.
    pub fn call(&self, this: &Value, args: &[Value]) -> CallResult<Value> {
        match &self.0.call {
            Some(call) => call(this, args),
            None => Err(Exception::type_error(
                ObjectError::NotCallable(self.0.id.to_string()).to_string(),
            )),
        }
    }

    /// Call a method of this object with the object as receiver.
    pub fn invoke(&self, name: &str, args: &[Value]) -> CallResult<Value> {
        let method = self.get(name)?;
        match method.as_callable() {
            Some(callable) => callable.call(&Value::Object(self.clone()), args),
            None => Err(Exception::type_error(
                ObjectError::NotCallable(name.to_string()).to_string(),
            )),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties = self.0.properties.try_read().map(|p| p.len());
        f.debug_struct("ObjectRef")
            .field("id", &self.0.id)
            .field("callable", &self.is_callable())
            .field("properties", &properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_data_property_round_trip() {
        let object = ObjectRef::new();
        object.set("a", 1).unwrap();
        assert_eq!(object.get("a").unwrap(), Value::from(1));
        assert!(object.get("missing").unwrap().is_undefined());
        assert_eq!(object.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let object = ObjectRef::new().with("b", 1).with("a", 2).with("c", 3);
        object.set("a", 5).unwrap();
        assert_eq!(object.keys(), vec!["b", "a", "c"]);

        object.delete("a");
        assert_eq!(object.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_accessor_property() {
        let object = ObjectRef::new().with("log", Value::array(vec![]));
        let setter = ObjectRef::function(|this, args| {
            let target = this.as_object().unwrap();
            target.get("log")?.as_array().unwrap().push(args[0].clone());
            Ok(Value::Undefined)
        });
        let getter = ObjectRef::function(|_, _| Ok(Value::from("computed")));
        object
            .define_property("prop", PropertyDescriptor::accessor(Some(getter), Some(setter)))
            .unwrap();

        object.set("prop", "written").unwrap();
        assert_eq!(object.get("prop").unwrap(), Value::from("computed"));
        let log = object.get("log").unwrap();
        assert_eq!(log.as_array().unwrap().get(0), Value::from("written"));
    }

    #[test]
    fn test_non_configurable_property() {
        let object = ObjectRef::new();
        object
            .define_property("fixed", PropertyDescriptor::data(1).with_configurable(false))
            .unwrap();

        let err = object
            .define_property("fixed", PropertyDescriptor::data(2))
            .unwrap_err();
        assert!(matches!(err, ObjectError::NonConfigurable(_)));
        assert!(!object.delete("fixed"));
        assert_eq!(object.get("fixed").unwrap(), Value::from(1));
    }

    #[test]
    fn test_read_only_assignment_is_ignored() {
        let object = ObjectRef::new();
        object
            .define_property("ro", PropertyDescriptor::data(1).with_writable(false))
            .unwrap();
        object.set("ro", 2).unwrap();
        assert_eq!(object.get("ro").unwrap(), Value::from(1));
    }

    #[test]
    fn test_invoke_binds_receiver() {
        let object = ObjectRef::new().with("name", "host");
        object.insert(
            "whoami",
            ObjectRef::function(|this, _| this.as_object().unwrap().get("name")),
        );
        assert_eq!(object.invoke("whoami", &[]).unwrap(), Value::from("host"));
        assert!(object.invoke("name", &[]).unwrap_err().is_type_error());
    }

    #[test]
    fn test_getter_may_reenter_object() {
        let object = ObjectRef::new().with("inner", 7);
        let getter = ObjectRef::function(|this, _| this.as_object().unwrap().get("inner"));
        object
            .define_property("outer", PropertyDescriptor::accessor(Some(getter), None))
            .unwrap();
        assert_eq!(object.get("outer").unwrap(), Value::from(7));
    }

    #[test]
    fn test_function_cyclic_sees_itself() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let function = ObjectRef::function_cyclic(move |weak| {
            native_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                let me = weak.upgrade().unwrap();
                Ok(Value::from(me.id().as_u64()))
            })
        });
        let result = function.call(&Value::Undefined, &[]).unwrap();
        assert_eq!(result, Value::from(function.id().as_u64()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_weak_handle() {
        let object = ObjectRef::new();
        let weak = object.downgrade();
        assert!(weak.upgrade().is_some());
        drop(object);
        assert!(!weak.is_alive());
    }
}
