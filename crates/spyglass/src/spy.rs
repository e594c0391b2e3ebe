//! The spy lifecycle handle.
//!
//! A [`Spy`] decorates one property of one object and undoes it on
//! [`Spy::reset`]. What gets decorated depends on the property's descriptor:
//!
//! - a data property holding a callable is wrapped with the function
//!   decorator, after spying on the callable's own function-valued
//!   properties and before logging access to its other properties;
//! - any other data property, and any accessor pair, goes through the
//!   property decorator.
//!
//! Active spies are tracked in a process-wide manifest keyed by object and
//! property, so spying twice on the same place returns the same spy, and in a
//! global list used by [`Spy::reset_all`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use spyglass_core::{ObjectId, ObjectRef, PropertyDescriptor, Slot, Value};
use spyglass_decorate::{
    decorate_method, decorate_property, is_reserved, revert_decorated_function,
    revert_decorated_property, AccessorRecord, HookHandle,
};
use spyglass_observe::{activity, emit, ActivityEntry, CallRecord, SpyEvent};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{SpyError, SpyResult};

/// Unique identifier of a spy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpyId(Uuid);

impl SpyId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SpyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a spy intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpyKind {
    /// A data property holding a callable.
    Callable,
    /// A data property holding anything else.
    DataProperty,
    /// A getter/setter pair.
    AccessorPair,
}

impl SpyKind {
    /// Classify a property by its descriptor, without invoking a getter.
    pub fn of(descriptor: &PropertyDescriptor) -> Self {
        match &descriptor.slot {
            Slot::Data { value, .. } if value.is_callable() => SpyKind::Callable,
            Slot::Data { .. } => SpyKind::DataProperty,
            Slot::Accessor { .. } => SpyKind::AccessorPair,
        }
    }

    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpyKind::Callable => "callable",
            SpyKind::DataProperty => "data_property",
            SpyKind::AccessorPair => "accessor_pair",
        }
    }
}

/// What was installed, kept for the reversal.
enum Installed {
    Function {
        decorated: ObjectRef,
        nested: Vec<Spy>,
        sub_properties: Vec<String>,
    },
    Property(AccessorRecord),
    Nothing,
}

struct SpyInner {
    id: SpyId,
    object: ObjectRef,
    property: String,
    kind: SpyKind,
    hooks: HookHandle,
    installed: Installed,
    active: AtomicBool,
}

/// Handle to one spied property.
///
/// Cloning a `Spy` gives another handle to the same spy.
#[derive(Clone)]
pub struct Spy {
    inner: Arc<SpyInner>,
}

type ManifestKey = (ObjectId, String);

static MANIFEST: LazyLock<DashMap<ManifestKey, Spy>> = LazyLock::new(DashMap::new);
static SPIES: LazyLock<DashMap<SpyId, Spy>> = LazyLock::new(DashMap::new);

impl Spy {
    /// Spy on `target[property]`.
    ///
    /// If an active spy already watches this property, that spy is returned
    /// and nothing is decorated again.
    ///
    /// A property that cannot be decorated (not configurable, read-only)
    /// is reported as a diagnostic event and yields an inactive spy.
    ///
    /// # Errors
    ///
    /// Returns [`SpyError::UndefinedProperty`] if `target` is not an object
    /// or has no own property named `property`.
    pub fn new(target: &Value, property: &str) -> SpyResult<Spy> {
        let object = target.as_object().ok_or(SpyError::UndefinedProperty)?;
        Self::create(object, property, &mut HashSet::new())
    }

    fn create(
        object: &ObjectRef,
        property: &str,
        path: &mut HashSet<ObjectId>,
    ) -> SpyResult<Spy> {
        let descriptor = object
            .get_own_property(property)
            .ok_or(SpyError::UndefinedProperty)?;

        if let Some(existing) = Self::find(object, property) {
            debug!(spy = %existing.id(), property, "Reusing active spy");
            return Ok(existing);
        }

        let kind = SpyKind::of(&descriptor);
        let hooks = HookHandle::default();
        let installed = match kind {
            SpyKind::Callable => install_function(object, property, &descriptor, &hooks, path),
            SpyKind::DataProperty | SpyKind::AccessorPair => {
                match decorate_property(object, property) {
                    Ok(record) => Installed::Property(record),
                    Err(_) => Installed::Nothing,
                }
            }
        };
        let active = !matches!(installed, Installed::Nothing);

        let spy = Spy {
            inner: Arc::new(SpyInner {
                id: SpyId::new(),
                object: object.clone(),
                property: property.to_string(),
                kind,
                hooks,
                installed,
                active: AtomicBool::new(active),
            }),
        };

        if active {
            MANIFEST.insert((object.id(), property.to_string()), spy.clone());
            SPIES.insert(spy.id(), spy.clone());
            debug!(
                spy = %spy.id(),
                object = %object.id(),
                property,
                kind = kind.as_str(),
                "Spy deployed"
            );
        }
        Ok(spy)
    }

    /// Find the active spy on `object[property]`.
    pub fn find(object: &ObjectRef, property: &str) -> Option<Spy> {
        MANIFEST
            .get(&(object.id(), property.to_string()))
            .map(|entry| entry.value().clone())
            .filter(Spy::is_active)
    }

    /// Reset every active spy.
    ///
    /// Returns the number of spies that were reset.
    pub fn reset_all() -> usize {
        let spies: Vec<Spy> = SPIES.iter().map(|entry| entry.value().clone()).collect();
        let reset = spies.iter().filter(|spy| spy.deactivate()).count();
        info!(reset, "Reset all spies");
        reset
    }

    /// Number of active spies.
    pub fn active_count() -> usize {
        SPIES.len()
    }

    /// Undo the decoration and deactivate the spy.
    ///
    /// Resetting an inactive spy does nothing.
    pub fn reset(&self) {
        if self.deactivate() {
            debug!(spy = %self.id(), property = %self.inner.property, "Spy reset");
        } else {
            emit(SpyEvent::SpyInactive {
                property: self.inner.property.clone(),
            });
        }
    }

    /// Deactivate the spy. Returns `false` if it was already inactive.
    fn deactivate(&self) -> bool {
        let inner = &self.inner;
        if !inner.active.swap(false, Ordering::SeqCst) {
            return false;
        }

        MANIFEST.remove_if(&(inner.object.id(), inner.property.clone()), |_, spy| {
            spy.id() == inner.id
        });
        SPIES.remove(&inner.id);

        match &inner.installed {
            Installed::Function {
                decorated,
                nested,
                sub_properties,
            } => {
                // Accessors go first so the reversal sees their last values.
                for name in sub_properties {
                    revert_decorated_property(decorated, name);
                }
                for spy in nested {
                    spy.deactivate();
                }
                revert_decorated_function(decorated);
            }
            Installed::Property(_) => revert_decorated_property(&inner.object, &inner.property),
            Installed::Nothing => {}
        }
        activity::delete_entry(&inner.object, &inner.property);
        true
    }

    /// Get the spy id.
    pub fn id(&self) -> SpyId {
        self.inner.id
    }

    /// Get the spied object.
    pub fn object(&self) -> &ObjectRef {
        &self.inner.object
    }

    /// Get the spied property name.
    pub fn property(&self) -> &str {
        &self.inner.property
    }

    /// Get what the spy intercepts.
    pub fn kind(&self) -> SpyKind {
        self.inner.kind
    }

    /// Check if the decoration is installed.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// The decorated callable installed by a function spy.
    pub fn decorated(&self) -> Option<&ObjectRef> {
        match &self.inner.installed {
            Installed::Function { decorated, .. } => Some(decorated),
            _ => None,
        }
    }

    /// Spies on the function-valued properties of the spied callable.
    pub fn nested(&self) -> &[Spy] {
        match &self.inner.installed {
            Installed::Function { nested, .. } => nested,
            _ => &[],
        }
    }

    /// Calls logged since the spy was deployed.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.activity()
            .and_then(|entry| entry.calls)
            .unwrap_or_default()
    }

    /// The activity log entry of the spied property.
    pub fn activity(&self) -> Option<ActivityEntry> {
        activity::entry_of(&self.inner.object, &self.inner.property)
    }

    /// The `before` hook.
    pub fn before(&self) -> Option<ObjectRef> {
        self.inner.hooks.snapshot().before
    }

    /// The `after` hook.
    pub fn after(&self) -> Option<ObjectRef> {
        self.inner.hooks.snapshot().after
    }

    /// The fake.
    pub fn fake(&self) -> Option<ObjectRef> {
        self.inner.hooks.snapshot().fake
    }

    /// Whether calls go through to the fake or original.
    pub fn call_through(&self) -> bool {
        self.inner.hooks.snapshot().call_through.unwrap_or(true)
    }

    /// Replace the `before` hook. Only function spies use it.
    pub fn set_before(&self, before: Option<ObjectRef>) {
        self.inner.hooks.set_before(before);
    }

    /// Replace the `after` hook. Only function spies use it.
    pub fn set_after(&self, after: Option<ObjectRef>) {
        self.inner.hooks.set_after(after);
    }

    /// Replace the fake. Only function spies use it.
    pub fn set_fake(&self, fake: Option<ObjectRef>) {
        self.inner.hooks.set_fake(fake);
    }

    /// Enable or disable call-through. Only function spies use it.
    pub fn set_call_through(&self, call_through: bool) {
        self.inner.hooks.set_call_through(call_through);
    }
}

fn install_function(
    object: &ObjectRef,
    property: &str,
    descriptor: &PropertyDescriptor,
    hooks: &HookHandle,
    path: &mut HashSet<ObjectId>,
) -> Installed {
    let Some(original) = descriptor.value().and_then(Value::as_callable).cloned() else {
        return Installed::Nothing;
    };

    // A callable reachable from its own properties is spied on once.
    let mut nested = Vec::new();
    if path.insert(original.id()) {
        for (name, sub) in original.entries() {
            if is_reserved(&name) || SpyKind::of(&sub) != SpyKind::Callable {
                continue;
            }
            if let Ok(spy) = Spy::create(&original, &name, path) {
                nested.push(spy);
            }
        }
        path.remove(&original.id());
    }

    let decorated = match decorate_method(object, property, hooks.clone()) {
        Ok(decorated) => decorated,
        Err(e) => {
            emit(SpyEvent::DecorationFailed {
                property: property.to_string(),
                reason: e.to_string(),
            });
            for spy in &nested {
                spy.deactivate();
            }
            return Installed::Nothing;
        }
    };

    let sub_properties = decorated
        .entries()
        .into_iter()
        .filter(|(name, sub)| !is_reserved(name) && SpyKind::of(sub) != SpyKind::Callable)
        .filter_map(|(name, _)| decorate_property(&decorated, &name).ok().map(|_| name))
        .collect();

    Installed::Function {
        decorated,
        nested,
        sub_properties,
    }
}

impl PartialEq for Spy {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Spy {}

impl fmt::Debug for Spy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spy")
            .field("id", &self.inner.id)
            .field("object", &self.inner.object.id())
            .field("property", &self.inner.property)
            .field("kind", &self.inner.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
