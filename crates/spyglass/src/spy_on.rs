//! Entry points for deploying and resetting spies.

use std::collections::HashSet;

use spyglass_core::{ObjectId, ObjectRef, Value};
use spyglass_observe::ACTIVITY_KEY;
use tracing::debug;

use crate::chain::SpyOnModule;
use crate::spy::Spy;
use crate::{SpyError, SpyResult};

/// Spy on `target[property]`, or on every property reachable from `target`.
///
/// With a property name, a property holding a plain object is walked instead
/// of spied on; anything else gets exactly one [`Spy`]. Without a property
/// name, every enumerable own property of `target` is spied on, descending
/// into plain objects. Arrays, callables and primitives are leaves. Each
/// object is walked once, so cyclic graphs terminate.
///
/// Properties that already have an active spy reuse it.
///
/// # Errors
///
/// Returns [`SpyError::UndefinedProperty`] if `target` is not an object or
/// lacks the named property.
pub fn spy_on<'a>(
    target: &Value,
    property: impl Into<Option<&'a str>>,
) -> SpyResult<SpyOnModule> {
    let object = target.as_object().ok_or(SpyError::UndefinedProperty)?;
    let property = property.into();
    let mut spies = Vec::new();
    let mut visited = HashSet::new();

    match property {
        Some(name) => match plain_object_at(object, name) {
            Some(child) => walk(&child, &mut visited, &mut spies),
            None => spies.push(Spy::new(target, name)?),
        },
        None => walk(object, &mut visited, &mut spies),
    }

    debug!(
        object = %object.id(),
        property = property.unwrap_or(""),
        spies = spies.len(),
        "Spies deployed"
    );
    Ok(SpyOnModule::new(
        object.clone(),
        property.map(str::to_string),
        spies,
    ))
}

/// Reset the spy on `target[property]`, or every spy reachable from `target`.
///
/// Locations without an active spy are skipped.
pub fn reset_spy<'a>(target: &Value, property: impl Into<Option<&'a str>>) {
    let Some(object) = target.as_object() else {
        return;
    };
    let mut visited = HashSet::new();

    match property.into() {
        Some(name) => reset_at(object, name, &mut visited),
        None => reset_walk(object, &mut visited),
    }
}

/// Reset every active spy, wherever it is.
pub fn reset_all_spies() {
    Spy::reset_all();
}

/// The plain object held in a data slot, without invoking getters.
fn plain_object_at(object: &ObjectRef, name: &str) -> Option<ObjectRef> {
    object
        .get_own_property(name)?
        .value()
        .filter(|value| value.is_plain_object())
        .and_then(Value::as_object)
        .cloned()
}

fn walk(object: &ObjectRef, visited: &mut HashSet<ObjectId>, spies: &mut Vec<Spy>) {
    if !visited.insert(object.id()) {
        return;
    }
    let target = Value::from(object);
    for name in object.keys() {
        if name == ACTIVITY_KEY {
            continue;
        }
        match plain_object_at(object, &name) {
            Some(child) => walk(&child, visited, spies),
            None => {
                if let Ok(spy) = Spy::new(&target, &name) {
                    spies.push(spy);
                }
            }
        }
    }
}

fn reset_at(object: &ObjectRef, name: &str, visited: &mut HashSet<ObjectId>) {
    match Spy::find(object, name) {
        Some(spy) => spy.reset(),
        None => match plain_object_at(object, name) {
            Some(child) => reset_walk(&child, visited),
            None => debug!(object = %object.id(), property = name, "No spy to reset"),
        },
    }
}

fn reset_walk(object: &ObjectRef, visited: &mut HashSet<ObjectId>) {
    if !visited.insert(object.id()) {
        return;
    }
    for name in object.keys() {
        if name != ACTIVITY_KEY {
            reset_at(object, &name, visited);
        }
    }
}
