//! Structural deep copy.
//!
//! Logged arguments, return values and property writes are deep copies so a
//! caller mutating its own data after the fact never rewrites history.

use std::collections::HashMap;

use crate::object::ObjectRef;
use crate::value::{ArrayRef, Value};

/// Deep-copy a value.
///
/// Plain objects and arrays are copied recursively; callables, pending values
/// and primitives are returned as they are. Only enumerable own properties of
/// objects are copied, and accessor properties are copied by reading them. A
/// getter that throws copies as `undefined`.
///
/// Cyclic structures produce copies with the same cycles.
pub fn deep_clone(value: &Value) -> Value {
    Cloner::default().clone_value(value)
}

/// Deep-copy a slice of values.
pub fn deep_clone_all(values: &[Value]) -> Vec<Value> {
    let mut cloner = Cloner::default();
    values.iter().map(|value| cloner.clone_value(value)).collect()
}

#[derive(Default)]
struct Cloner {
    arrays: HashMap<usize, ArrayRef>,
    objects: HashMap<usize, ObjectRef>,
}

impl Cloner {
    fn clone_value(&mut self, value: &Value) -> Value {
        match value {
            Value::Array(array) => Value::Array(self.clone_array(array)),
            Value::Object(object) if !object.is_callable() => {
                Value::Object(self.clone_object(object))
            }
            other => other.clone(),
        }
    }

    fn clone_array(&mut self, array: &ArrayRef) -> ArrayRef {
        if let Some(copy) = self.arrays.get(&array.addr()) {
            return copy.clone();
        }

        let copy = ArrayRef::new();
        self.arrays.insert(array.addr(), copy.clone());
        for item in array.to_vec() {
            let item = self.clone_value(&item);
            copy.push(item);
        }
        copy
    }

    fn clone_object(&mut self, object: &ObjectRef) -> ObjectRef {
        if let Some(copy) = self.objects.get(&object.addr()) {
            return copy.clone();
        }

        let copy = ObjectRef::new();
        self.objects.insert(object.addr(), copy.clone());
        for key in object.keys() {
            let item = object.get(&key).unwrap_or_default();
            let item = self.clone_value(&item);
            copy.insert(key, item);
        }
        copy
    }
}
