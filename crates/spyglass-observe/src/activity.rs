//! The activity log kept on spied objects.
//!
//! Reads, writes and calls are recorded under the non-enumerable `_spy_`
//! property of the object that holds the spied property:
//!
//! ```text
//! _spy_: {
//!     count: { reads: 2, writes: [1, 2] },
//!     sum:   { calls: [{ args: [1, 1], return: 2 }] },
//! }
//! ```
//!
//! Decorated callables also carry their own `calls` list. Every record call
//! rebuilds the exposed state from the caller's private log, so a container
//! or list overwritten by outside code is restored on the next record.

use serde::Serialize;
use spyglass_core::{deep_clone, deep_clone_all, ArrayRef, ObjectRef, PropertyDescriptor, Value};

use crate::events::{emit, SpyEvent};

/// Reserved property holding the activity log.
pub const ACTIVITY_KEY: &str = "_spy_";

/// Property of a decorated callable holding its call log.
pub const CALLS_KEY: &str = "calls";

/// One logged call.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// Deep copies of the arguments.
    pub args: Vec<Value>,
    /// Deep copy of the return value, or the error marker.
    #[serde(rename = "return")]
    pub ret: Value,
}

impl CallRecord {
    /// Create a call record.
    pub fn new(args: Vec<Value>, ret: Value) -> Self {
        Self { args, ret }
    }

    /// Render as an `{ args, return }` object with fresh copies.
    pub fn to_value(&self) -> Value {
        ObjectRef::new()
            .with("args", Value::array(deep_clone_all(&self.args)))
            .with("return", deep_clone(&self.ret))
            .into()
    }

    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let args = object.get("args").ok()?.as_array()?.to_vec();
        let ret = object.get("return").ok()?;
        Some(Self::new(args, ret))
    }
}

/// Typed view of one entry of the activity log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityEntry {
    /// Number of reads, for decorated properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reads: Option<u64>,
    /// Written values, for decorated properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<Vec<Value>>,
    /// Logged calls, for decorated callables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<Vec<CallRecord>>,
}

impl ActivityEntry {
    fn from_object(entry: &ObjectRef) -> Self {
        let reads = entry
            .get("reads")
            .ok()
            .and_then(|reads| reads.as_number())
            .map(|reads| reads as u64);
        let writes = entry
            .get("writes")
            .ok()
            .and_then(|writes| writes.as_array().map(ArrayRef::to_vec));
        let calls = entry.get(CALLS_KEY).ok().and_then(|calls| {
            calls
                .as_array()
                .map(|calls| calls.to_vec().iter().filter_map(CallRecord::from_value).collect())
        });
        Self {
            reads,
            writes,
            calls,
        }
    }
}

/// Get the log container, re-creating it when missing or overwritten.
fn container(object: &ObjectRef) -> ObjectRef {
    if let Some(existing) = existing_container(object) {
        return existing;
    }

    let fresh = ObjectRef::new();
    let descriptor = PropertyDescriptor::data(fresh.clone()).with_enumerable(false);
    if object.define_property(ACTIVITY_KEY, descriptor).is_err() {
        tracing::warn!(key = ACTIVITY_KEY, "Activity log container is not configurable");
    }
    fresh
}

fn existing_container(object: &ObjectRef) -> Option<ObjectRef> {
    let descriptor = object.get_own_property(ACTIVITY_KEY)?;
    descriptor
        .value()
        .filter(|value| value.is_plain_object())
        .and_then(Value::as_object)
        .cloned()
}

/// Get the entry for `name`, re-creating it when missing or overwritten.
fn entry(container: &ObjectRef, name: &str) -> ObjectRef {
    match container.get(name) {
        Ok(Value::Object(existing)) if !existing.is_callable() => existing,
        _ => {
            let fresh = ObjectRef::new();
            container.insert(name, fresh.clone());
            fresh
        }
    }
}

/// Record that `name` on `object` has now been read `reads` times.
pub fn record_read(object: &ObjectRef, name: &str, reads: u64) {
    let entry = entry(&container(object), name);
    entry.insert("reads", reads);
    emit(SpyEvent::PropertyRead {
        property: name.to_string(),
        reads,
    });
}

/// Record the full write history of `name` on `object`.
///
/// The stored list holds copies; the last element is reported as the new
/// value.
pub fn record_write(object: &ObjectRef, name: &str, writes: &[Value]) {
    let entry = entry(&container(object), name);
    entry.insert("writes", Value::array(deep_clone_all(writes)));
    let value = writes.last().map(Value::to_string).unwrap_or_default();
    emit(SpyEvent::PropertyWritten {
        property: name.to_string(),
        value,
    });
}

/// Record the full call history of a decorated callable.
///
/// The list is exposed as `calls` on `decorated`, and mirrored into the
/// activity log of `host` when the callable lives at `host[name]`.
pub fn record_call(
    decorated: &ObjectRef,
    host: Option<(&ObjectRef, &str)>,
    calls: &[CallRecord],
) {
    let exposed = Value::array(calls.iter().map(CallRecord::to_value).collect());
    decorated.insert(CALLS_KEY, exposed.clone());

    if let Some((host, name)) = host {
        let entry = entry(&container(host), name);
        entry.insert(CALLS_KEY, exposed);
    }
}

/// Remove the activity log entry of `name`, and the container once empty.
///
/// Only the log is touched; whatever `object[name]` holds is left alone.
pub fn delete_entry(object: &ObjectRef, name: &str) {
    if let Some(container) = existing_container(object) {
        container.delete(name);
        if container.is_empty() {
            object.delete(ACTIVITY_KEY);
        }
    }
}

/// Remove the `calls` list exposed on a decorated callable.
///
/// A `calls` property that is not a list belongs to someone else and stays.
pub fn clear_calls(decorated: &ObjectRef) {
    let has_calls = decorated
        .get_own_property(CALLS_KEY)
        .and_then(|descriptor| descriptor.value().map(|calls| calls.as_array().is_some()))
        .unwrap_or(false);
    if has_calls {
        decorated.delete(CALLS_KEY);
    }
}

/// Typed view of the entry of `name`, if one exists.
pub fn entry_of(object: &ObjectRef, name: &str) -> Option<ActivityEntry> {
    let container = existing_container(object)?;
    match container.get(name).ok()? {
        Value::Object(entry) if !entry.is_callable() => Some(ActivityEntry::from_object(&entry)),
        _ => None,
    }
}

/// Typed view of every entry on `object`, in insertion order.
pub fn snapshot(object: &ObjectRef) -> Vec<(String, ActivityEntry)> {
    let Some(container) = existing_container(object) else {
        return Vec::new();
    };
    container
        .keys()
        .into_iter()
        .filter_map(|name| {
            let entry = entry_of(object, &name)?;
            Some((name, entry))
        })
        .collect()
}

/// Check if `object` carries an activity log.
pub fn has_activity(object: &ObjectRef) -> bool {
    existing_container(object).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_json(object: &ObjectRef) -> serde_json::Value {
        object.get(ACTIVITY_KEY).unwrap().to_json()
    }

    #[test]
    fn test_reads_and_writes() {
        let object = ObjectRef::new().with("prop", 1);
        record_read(&object, "prop", 1);
        record_read(&object, "prop", 2);
        record_write(&object, "prop", &[Value::from("a"), Value::from("b")]);

        assert_eq!(log_json(&object), json!({"prop": {"reads": 2, "writes": ["a", "b"]}}));

        let entry = entry_of(&object, "prop").unwrap();
        assert_eq!(entry.reads, Some(2));
        assert_eq!(entry.writes.unwrap().len(), 2);
        assert!(entry.calls.is_none());
    }

    #[test]
    fn test_container_is_not_enumerable() {
        let object = ObjectRef::new().with("prop", 1);
        record_read(&object, "prop", 1);
        assert_eq!(object.keys(), vec!["prop"]);
        assert!(has_activity(&object));
    }

    #[test]
    fn test_writes_are_copies() {
        let object = ObjectRef::new();
        let written = Value::from(json!({"a": 1}));
        record_write(&object, "prop", std::slice::from_ref(&written));
        written.as_object().unwrap().set("a", 3).unwrap();

        assert_eq!(log_json(&object), json!({"prop": {"writes": [{"a": 1}]}}));
    }

    #[test]
    fn test_overwritten_container_is_rebuilt() {
        let object = ObjectRef::new();
        record_read(&object, "prop", 1);
        object.set(ACTIVITY_KEY, "whoops").unwrap();
        record_read(&object, "prop", 2);
        assert_eq!(log_json(&object), json!({"prop": {"reads": 2}}));

        let container = object.get(ACTIVITY_KEY).unwrap();
        container.as_object().unwrap().set("prop", 5).unwrap();
        record_write(&object, "prop", &[Value::from(1)]);
        assert_eq!(log_json(&object), json!({"prop": {"writes": [1]}}));
    }

    #[test]
    fn test_calls_are_exposed_and_restored() {
        let host = ObjectRef::new();
        let decorated = ObjectRef::function(|_, _| Ok(Value::Undefined));
        host.insert("sum", decorated.clone());

        let calls = vec![CallRecord::new(vec![Value::from(1), Value::from(2)], Value::from(3))];
        record_call(&decorated, Some((&host, "sum")), &calls);

        let expected = json!([{"args": [1, 2], "return": 3}]);
        assert_eq!(decorated.get(CALLS_KEY).unwrap().to_json(), expected);
        assert_eq!(log_json(&host), json!({"sum": {"calls": expected.clone()}}));

        decorated.set(CALLS_KEY, "tampered").unwrap();
        record_call(&decorated, Some((&host, "sum")), &calls);
        assert_eq!(decorated.get(CALLS_KEY).unwrap().to_json(), expected);

        let entry = entry_of(&host, "sum").unwrap();
        let logged = entry.calls.unwrap();
        assert_eq!(logged[0].ret, Value::from(3));
    }

    #[test]
    fn test_delete_entry_removes_empty_container() {
        let host = ObjectRef::new().with("a", 1).with("b", 2);
        record_read(&host, "a", 1);
        record_read(&host, "b", 1);

        delete_entry(&host, "a");
        assert_eq!(snapshot(&host).len(), 1);

        delete_entry(&host, "b");
        assert!(!host.has_own_property(ACTIVITY_KEY));
        assert!(snapshot(&host).is_empty());

        // Nothing to delete is fine.
        delete_entry(&host, "b");
    }

    #[test]
    fn test_delete_entry_leaves_slot_alone() {
        let host = ObjectRef::new();
        let function = ObjectRef::function(|_, _| Ok(Value::Undefined));
        host.insert("f", function.clone());
        record_call(&function, Some((&host, "f")), &[]);
        assert!(function.has_own_property(CALLS_KEY));

        delete_entry(&host, "f");
        assert!(!host.has_own_property(ACTIVITY_KEY));
        // The callable now at `f` may be logging for someone else.
        assert!(function.has_own_property(CALLS_KEY));

        clear_calls(&function);
        assert!(!function.has_own_property(CALLS_KEY));
    }

    #[test]
    fn test_clear_calls_keeps_foreign_property() {
        let function = ObjectRef::function(|_, _| Ok(Value::Undefined));
        function.insert(CALLS_KEY, "not a log");
        clear_calls(&function);
        assert_eq!(function.get(CALLS_KEY).unwrap(), Value::from("not a log"));
    }

    #[test]
    fn test_call_record_serializes_return_key() {
        let record = CallRecord::new(vec![Value::from("x")], Value::Undefined);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"args": ["x"], "return": null})
        );
    }
}
