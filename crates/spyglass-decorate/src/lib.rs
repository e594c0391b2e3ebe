//! Spyglass Decorators
//!
//! This crate intercepts calls and property accesses on host objects:
//!
//! - [`decorate_function`]: Wrap a callable with `before`, `after` and `fake`
//!   hooks and log every call
//! - [`decorate_property`]: Log reads and writes of a single property
//! - [`revert_decorated_function`] / [`revert_decorated_property`]: Undo a
//!   decoration
//! - [`DecorationRegistry`]: Process-wide record of what was decorated
//!
//! # Decorating a Method
//!
//! ```ignore
//! use spyglass_decorate::{decorate_method, DecoratorConfig, revert_decorated_function};
//!
//! let decorated = decorate_method(&object, "save", DecoratorConfig::new().with_fake(fake))?;
//! object.invoke("save", &[Value::from(1)])?;
//!
//! let original = revert_decorated_function(&decorated);
//! ```
//!
//! # Decorating a Property
//!
//! ```ignore
//! use spyglass_decorate::{decorate_property, revert_decorated_property};
//!
//! let record = decorate_property(&object, "count")?;
//! object.get("count")?;
//! assert_eq!(record.reads(), 1);
//!
//! revert_decorated_property(&object, "count");
//! ```

pub mod config;
pub mod error;
pub mod function;
pub mod hook;
pub mod property;
pub mod registry;

// Re-export main types
pub use config::{is_reserved, DecoratorConfig, HookHandle, RESERVED_NAMES};
pub use error::{DecorateError, DecorateResult, HookError, PropertyError, PropertyResult};
pub use function::{
    decorate_callable, decorate_function, decorate_method, is_decorated_function,
    original_function, revert_decorated_function, DecorationTarget,
};
pub use property::{decorate_property, revert_decorated_property, AccessorRecord};
pub use registry::{accessors, decorations, AccessorRegistry, DecorationRecord, DecorationRegistry};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::DecoratorConfig;
    pub use crate::error::{DecorateError, DecorateResult, PropertyError};
    pub use crate::function::{decorate_function, revert_decorated_function};
    pub use crate::property::{decorate_property, revert_decorated_property};
}
