//! Guarded execution of hooks.
//!
//! Every phase of a decorated call (`before`, the fake or original, `after`)
//! runs through [`guarded`]: an error is turned into a [`HookError`], reported
//! as a [`SpyEvent::HookFailed`] and handed back so the caller can carry on.

use spyglass_core::CallResult;
use spyglass_observe::{emit, HookPhase, SpyEvent};

use crate::error::HookError;

/// Run `f`, reporting any error it raises.
pub fn guarded<T, F>(phase: HookPhase, name: &str, f: F) -> Result<T, HookError>
where
    F: FnOnce() -> CallResult<T>,
{
    f().map_err(|exception| fail(phase, name, exception.message))
}

/// Report a failure that was not raised through [`guarded`], such as a
/// rejected pending value.
pub fn fail(phase: HookPhase, name: &str, message: String) -> HookError {
    emit(SpyEvent::HookFailed {
        phase,
        name: name.to_string(),
        message: message.clone(),
    });
    HookError { phase, message }
}
