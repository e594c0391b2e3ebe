//! Process-wide registries of decorations.
//!
//! [`DecorationRegistry`] maps every decorated callable to what is needed to
//! undo it; [`AccessorRegistry`] does the same for decorated properties.
//! Both are keyed by [`ObjectId`], never by the objects themselves, so an
//! entry keeps alive only what the reversal needs.

use std::sync::LazyLock;

use dashmap::DashMap;
use spyglass_core::{ObjectId, ObjectRef, Value, WeakObjectRef};
use tracing::debug;

use crate::property::AccessorRecord;

/// Reversal data for one decorated callable.
#[derive(Debug, Clone)]
pub struct DecorationRecord {
    /// The callable that existed before decoration.
    pub original: ObjectRef,
    /// The object that held the callable, for decorations made by name.
    pub host: Option<WeakObjectRef>,
    /// The property name on `host`.
    pub name: Option<String>,
    /// The decorated callable.
    pub decorated: WeakObjectRef,
    /// Properties copied onto the decorated callable at decoration time.
    pub snapshot: Vec<(String, Value)>,
}

impl DecorationRecord {
    /// Get the host and property name, if the host still exists.
    pub fn host(&self) -> Option<(ObjectRef, &str)> {
        let host = self.host.as_ref()?.upgrade()?;
        Some((host, self.name.as_deref()?))
    }

    /// Get the value a copied property had at decoration time.
    pub fn snapshot_value(&self, name: &str) -> Option<&Value> {
        self.snapshot
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Registry of decorated callables.
#[derive(Debug, Default)]
pub struct DecorationRegistry {
    records: DashMap<ObjectId, DecorationRecord>,
}

impl DecorationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decorated callable.
    pub fn register(&self, decorated: ObjectId, record: DecorationRecord) {
        debug!(
            decorated = %decorated,
            original = %record.original.id(),
            name = record.name.as_deref().unwrap_or(""),
            "Registered decorated function"
        );
        self.records.insert(decorated, record);
    }

    /// Look up the record of a decorated callable.
    pub fn lookup(&self, decorated: ObjectId) -> Option<DecorationRecord> {
        self.records.get(&decorated).map(|r| r.value().clone())
    }

    /// Remove and return the record of a decorated callable.
    pub fn unregister(&self, decorated: ObjectId) -> Option<DecorationRecord> {
        self.records.remove(&decorated).map(|(id, record)| {
            debug!(decorated = %id, "Unregistered decorated function");
            record
        })
    }

    /// Check if a callable is registered as decorated.
    pub fn contains(&self, decorated: ObjectId) -> bool {
        self.records.contains_key(&decorated)
    }

    /// Drop records whose decorated callable no longer exists.
    ///
    /// Returns the number of records removed.
    pub fn prune(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.decorated.is_alive());
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "Pruned decoration records");
        }
        removed
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Registry of decorated properties.
#[derive(Debug, Default)]
pub struct AccessorRegistry {
    records: DashMap<(ObjectId, String), AccessorRecord>,
}

impl AccessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decorated property.
    pub fn register(&self, object: ObjectId, name: &str, record: AccessorRecord) {
        debug!(object = %object, property = name, "Registered decorated property");
        self.records.insert((object, name.to_string()), record);
    }

    /// Look up the record of a decorated property.
    pub fn lookup(&self, object: ObjectId, name: &str) -> Option<AccessorRecord> {
        self.records
            .get(&(object, name.to_string()))
            .map(|r| r.value().clone())
    }

    /// Remove and return the record of a decorated property.
    pub fn unregister(&self, object: ObjectId, name: &str) -> Option<AccessorRecord> {
        self.records
            .remove(&(object, name.to_string()))
            .map(|(_, record)| record)
    }

    /// Check if a property is registered as decorated.
    pub fn contains(&self, object: ObjectId, name: &str) -> bool {
        self.records.contains_key(&(object, name.to_string()))
    }

    /// Drop records whose object no longer exists.
    ///
    /// Wrapped accessors are only released here, so prune this registry
    /// before [`DecorationRegistry::prune`].
    ///
    /// Returns the number of records removed.
    pub fn prune(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.is_alive());
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "Pruned accessor records");
        }
        removed
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

static DECORATIONS: LazyLock<DecorationRegistry> = LazyLock::new(DecorationRegistry::new);
static ACCESSORS: LazyLock<AccessorRegistry> = LazyLock::new(AccessorRegistry::new);

/// The process-wide registry of decorated callables.
pub fn decorations() -> &'static DecorationRegistry {
    &DECORATIONS
}

/// The process-wide registry of decorated properties.
pub fn accessors() -> &'static AccessorRegistry {
    &ACCESSORS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ObjectRef {
        ObjectRef::function(|_, _| Ok(Value::Undefined))
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = DecorationRegistry::new();
        let original = noop();
        let decorated = noop();
        let host = ObjectRef::new();

        registry.register(
            decorated.id(),
            DecorationRecord {
                original: original.clone(),
                host: Some(host.downgrade()),
                name: Some("f".to_string()),
                decorated: decorated.downgrade(),
                snapshot: vec![("helper".to_string(), Value::from(1))],
            },
        );

        assert!(registry.contains(decorated.id()));
        let record = registry.lookup(decorated.id()).unwrap();
        assert!(record.original.ptr_eq(&original));
        assert_eq!(record.host().unwrap().1, "f");
        assert_eq!(record.snapshot_value("helper"), Some(&Value::from(1)));

        assert!(registry.unregister(decorated.id()).is_some());
        assert!(registry.unregister(decorated.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_host_gone() {
        let host = ObjectRef::new();
        let record = DecorationRecord {
            original: noop(),
            host: Some(host.downgrade()),
            name: Some("f".to_string()),
            decorated: noop().downgrade(),
            snapshot: Vec::new(),
        };
        drop(host);
        assert!(record.host().is_none());
    }

    #[test]
    fn test_prune_drops_dead_records() {
        let registry = DecorationRegistry::new();
        let kept = noop();
        let dropped = noop();

        for decorated in [&kept, &dropped] {
            registry.register(
                decorated.id(),
                DecorationRecord {
                    original: noop(),
                    host: None,
                    name: None,
                    decorated: decorated.downgrade(),
                    snapshot: Vec::new(),
                },
            );
        }

        let dropped_id = dropped.id();
        drop(dropped);
        assert_eq!(registry.prune(), 1);
        assert!(registry.contains(kept.id()));
        assert!(!registry.contains(dropped_id));
        assert_eq!(registry.prune(), 0);
    }

    #[test]
    fn test_prune_drops_records_of_dead_objects() {
        let registry = AccessorRegistry::new();
        let kept = ObjectRef::new().with("prop", 1);
        let dropped = ObjectRef::new().with("prop", 2);

        for object in [&kept, &dropped] {
            let record = crate::property::decorate_property(object, "prop").unwrap();
            registry.register(object.id(), "prop", record);
        }

        let dropped_id = dropped.id();
        drop(dropped);
        assert_eq!(registry.prune(), 1);
        assert!(registry.contains(kept.id(), "prop"));
        assert!(!registry.contains(dropped_id, "prop"));

        accessors().prune();
        assert!(!accessors().contains(dropped_id, "prop"));
        crate::property::revert_decorated_property(&kept, "prop");
    }
}
