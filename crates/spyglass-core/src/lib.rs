//! Spyglass Core - Host Object Model
//!
//! This crate provides the dynamic object model the rest of Spyglass
//! instruments. It includes:
//!
//! - [`Value`]: Dynamic values (primitives, arrays, objects, pending values)
//! - [`ObjectRef`]: Shared objects with ordered properties and optional call behavior
//! - [`PropertyDescriptor`]: Data slots and accessor pairs
//! - [`Pending`]: Values that settle later
//! - [`deep_clone`]: Structural copies used for logging
//!
//! # Quick Start
//!
//! ```ignore
//! use spyglass_core::prelude::*;
//!
//! let host = ObjectRef::new().with("count", 1);
//! host.insert(
//!     "bump",
//!     ObjectRef::function(|this, _| {
//!         let this = this.as_object().unwrap();
//!         let next = this.get("count")?.as_number().unwrap_or(0.0) + 1.0;
//!         this.set("count", next)?;
//!         Ok(Value::from(next))
//!     }),
//! );
//!
//! assert_eq!(host.invoke("bump", &[])?, Value::from(2));
//! ```
//!
//! # Identity
//!
//! Arrays, objects and pending values are shared handles. Cloning a [`Value`]
//! clones the handle, and equality on those variants is identity. Use
//! [`deep_clone`] for a structural copy and [`Value::to_json`] for structural
//! comparison.

pub mod clone;
pub mod error;
pub mod object;
pub mod pending;
pub mod value;

// Re-export main types at crate root
pub use clone::{deep_clone, deep_clone_all};
pub use error::{CallResult, Exception, ExceptionKind, ObjectError, ObjectResult};
pub use object::{native_fn, NativeFn, ObjectId, ObjectRef, PropertyDescriptor, Slot, WeakObjectRef};
pub use pending::{Pending, Settlement};
pub use value::{ArrayRef, Value};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use spyglass_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clone::deep_clone;
    pub use crate::error::{CallResult, Exception};
    pub use crate::object::{ObjectRef, PropertyDescriptor};
    pub use crate::pending::Pending;
    pub use crate::value::{ArrayRef, Value};
}
