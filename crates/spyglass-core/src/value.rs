//! Dynamic values of the host object model.
//!
//! [`Value`] is the unit everything else in Spyglass trades in: call
//! arguments, return values, property contents and log entries. Primitive
//! variants are compared by value, reference variants ([`ArrayRef`],
//! [`ObjectRef`], [`Pending`]) by identity.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::CallResult;
use crate::object::ObjectRef;
use crate::pending::Pending;

/// Marker rendered in place of a reference that is already being rendered.
const CIRCULAR: &str = "[Circular]";

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Undefined,
    /// The explicit empty value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// An immutable string.
    String(Arc<str>),
    /// A shared, mutable sequence.
    Array(ArrayRef),
    /// A shared object, callable or plain.
    Object(ObjectRef),
    /// A value that settles later.
    Pending(Pending),
}

impl Value {
    /// Create a callable value from a native closure.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
    {
        Value::Object(ObjectRef::function(f))
    }

    /// Create an empty plain object.
    pub fn object() -> Self {
        Value::Object(ObjectRef::new())
    }

    /// Create an array from values.
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(ArrayRef::from_vec(values))
    }

    /// Name of the value's runtime type, as `typeof` reports it.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(object) if object.is_callable() => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Pending(_) => "object",
        }
    }

    /// Check if the value is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if the value can be called.
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(object) if object.is_callable())
    }

    /// Check if the value is a non-callable object.
    pub fn is_plain_object(&self) -> bool {
        matches!(self, Value::Object(object) if !object.is_callable())
    }

    /// Get the object, if this is one.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Get the callable object, if this is one.
    pub fn as_callable(&self) -> Option<&ObjectRef> {
        self.as_object().filter(|object| object.is_callable())
    }

    /// Get the array, if this is one.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Get the pending value, if this is one.
    pub fn as_pending(&self) -> Option<&Pending> {
        match self {
            Value::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Get the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `Object.is` comparison: like `==` on [`Value`], except that `NaN`
    /// equals itself and `0` differs from `-0`.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() || b.is_nan() => {
                a.is_nan() && b.is_nan()
            }
            (Value::Number(a), Value::Number(b)) => {
                a == b && a.is_sign_negative() == b.is_sign_negative()
            }
            _ => self == other,
        }
    }

    /// Structural rendering for assertions and diagnostics.
    ///
    /// `undefined` renders as `null`, callables as `"[Function]"` and pending
    /// values as `"[Pending]"`. A reference reached again while it is still
    /// being rendered renders as `"[Circular]"`.
    pub fn to_json(&self) -> JsonValue {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<usize>) -> JsonValue {
        match self {
            Value::Undefined | Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.to_string()),
            Value::Array(array) => {
                if !seen.insert(array.addr()) {
                    return JsonValue::String(CIRCULAR.to_string());
                }
                let items = array
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(seen))
                    .collect();
                seen.remove(&array.addr());
                JsonValue::Array(items)
            }
            Value::Object(object) if object.is_callable() => {
                JsonValue::String("[Function]".to_string())
            }
            Value::Object(object) => {
                if !seen.insert(object.addr()) {
                    return JsonValue::String(CIRCULAR.to_string());
                }
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    let value = object.get(&key).unwrap_or_default();
                    map.insert(key, value.to_json_inner(seen));
                }
                seen.remove(&object.addr());
                JsonValue::Object(map)
            }
            Value::Pending(_) => JsonValue::String("[Pending]".to_string()),
        }
    }

    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>, seen: &mut HashSet<usize>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(array) => {
                if !seen.insert(array.addr()) {
                    return Ok(());
                }
                for (i, item) in array.to_vec().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        item.fmt_inner(f, seen)?;
                    }
                }
                seen.remove(&array.addr());
                Ok(())
            }
            Value::Object(object) if object.is_callable() => write!(f, "function"),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Pending(_) => write!(f, "[object Promise]"),
        }
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Pending(a), Value::Pending(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_inner(f, &mut HashSet::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(array) => write!(f, "{:?}", array),
            Value::Object(object) => write!(f, "{:?}", object),
            Value::Pending(pending) => write!(f, "{:?}", pending),
            other => write!(f, "{}", other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<&ObjectRef> for Value {
    fn from(object: &ObjectRef) -> Self {
        Value::Object(object.clone())
    }
}

impl From<ArrayRef> for Value {
    fn from(array: ArrayRef) -> Self {
        Value::Array(array)
    }
}

impl From<Pending> for Value {
    fn from(pending: Pending) -> Self {
        Value::Pending(pending)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::from(s),
            JsonValue::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            JsonValue::Object(map) => {
                let object = ObjectRef::new();
                for (key, item) in map {
                    object.insert(key, Value::from(item));
                }
                Value::Object(object)
            }
        }
    }
}

/// A shared, mutable, ordered sequence of values.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

impl ArrayRef {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array holding the given values.
    pub fn from_vec(values: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(values)))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Check if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Get the element at `index`, or `undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.0.read().get(index).cloned().unwrap_or_default()
    }

    /// Set the element at `index`, padding with `undefined` as needed.
    pub fn set(&self, index: usize, value: Value) {
        let mut items = self.0.write();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
    }

    /// Append an element.
    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    /// Copy out the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Check if two handles refer to the same array.
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef").field("len", &self.len()).finish()
    }
}
