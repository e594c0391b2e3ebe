//! Values that settle later.
//!
//! A [`Pending`] is settled exactly once, either fulfilled with a [`Value`] or
//! rejected with an [`Exception`]. Continuations registered before settlement
//! run when it settles; continuations registered afterwards run immediately.
//! Nothing ever blocks waiting for a settlement.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Exception;
use crate::value::Value;

type Continuation = Box<dyn FnOnce(&Settlement) + Send>;

/// Outcome of a pending value.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// Settled with a value.
    Fulfilled(Value),
    /// Settled with an error.
    Rejected(Exception),
}

impl Settlement {
    /// Check if the value was fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled(_))
    }

    /// Get the fulfilled value.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Settlement::Fulfilled(value) => Some(value),
            Settlement::Rejected(_) => None,
        }
    }

    /// Get the rejection.
    pub fn error(&self) -> Option<&Exception> {
        match self {
            Settlement::Rejected(error) => Some(error),
            Settlement::Fulfilled(_) => None,
        }
    }
}

enum PendingState {
    Waiting(Vec<Continuation>),
    Settled(Settlement),
}

/// Shared handle to a value that settles later.
#[derive(Clone)]
pub struct Pending(Arc<Mutex<PendingState>>);

impl Default for Pending {
    fn default() -> Self {
        Self::new()
    }
}

impl Pending {
    /// Create an unsettled value.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(PendingState::Waiting(Vec::new()))))
    }

    /// Create a value that is already fulfilled.
    pub fn resolved(value: impl Into<Value>) -> Self {
        Self(Arc::new(Mutex::new(PendingState::Settled(
            Settlement::Fulfilled(value.into()),
        ))))
    }

    /// Create a value that is already rejected.
    pub fn rejected(error: Exception) -> Self {
        Self(Arc::new(Mutex::new(PendingState::Settled(
            Settlement::Rejected(error),
        ))))
    }

    /// Fulfill the value. Returns `false` if it had already settled.
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.settle(Settlement::Fulfilled(value.into()))
    }

    /// Reject the value. Returns `false` if it had already settled.
    pub fn reject(&self, error: Exception) -> bool {
        self.settle(Settlement::Rejected(error))
    }

    /// Settle with the given outcome. Returns `false` if it had already
    /// settled.
    pub fn settle(&self, settlement: Settlement) -> bool {
        let continuations = {
            let mut state = self.0.lock();
            match &mut *state {
                PendingState::Settled(_) => return false,
                PendingState::Waiting(continuations) => {
                    let continuations = std::mem::take(continuations);
                    *state = PendingState::Settled(settlement.clone());
                    continuations
                }
            }
        };

        for continuation in continuations {
            continuation(&settlement);
        }
        true
    }

    /// Get the outcome if settled.
    pub fn settlement(&self) -> Option<Settlement> {
        match &*self.0.lock() {
            PendingState::Settled(settlement) => Some(settlement.clone()),
            PendingState::Waiting(_) => None,
        }
    }

    /// Check if the value has settled.
    pub fn is_settled(&self) -> bool {
        matches!(&*self.0.lock(), PendingState::Settled(_))
    }

    /// Run `continuation` once the value settles.
    pub fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(&Settlement) + Send + 'static,
    {
        let settled = {
            let mut state = self.0.lock();
            match &mut *state {
                PendingState::Waiting(continuations) => {
                    continuations.push(Box::new(continuation));
                    return;
                }
                PendingState::Settled(settlement) => settlement.clone(),
            }
        };
        continuation(&settled);
    }

    /// Run `continuation` once this value settles, then settle the returned
    /// value with the same outcome.
    pub fn then<F>(&self, continuation: F) -> Pending
    where
        F: FnOnce(&Settlement) + Send + 'static,
    {
        let chained = Pending::new();
        let target = chained.clone();
        self.on_settle(move |settlement| {
            continuation(settlement);
            target.settle(settlement.clone());
        });
        chained
    }

    /// Check if two handles refer to the same pending value.
    pub fn ptr_eq(&self, other: &Pending) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("settled", &self.is_settled())
            .finish()
    }
}
