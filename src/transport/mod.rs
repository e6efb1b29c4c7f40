//! Transport boundary.
//!
//! The engine drives a single shared connection to the backend through the
//! [`Connection`] trait. Subscribe and unsubscribe are synchronous and never
//! retried. Inbound events reach the engine as `(sender connection, raw event)`
//! pairs through the [`EventHandler`] registered with each subscription set.
//!
//! Implementations must not invoke handlers from inside `subscribe` or
//! `unsubscribe`: the registry holds its per-scope section across those calls.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransportError;
use crate::event::{RawEvent, SubscriptionFilter, SubscriptionSetId};

/// In-process reference transport.
pub mod in_process;

pub use in_process::{InProcessConfig, InProcessConnection};

/// Shared handle back to the backend connection.
pub type ConnectionHandle = Arc<dyn Connection>;

/// Function invoked for each delivered event.
pub type HandlerFn = dyn Fn(&ConnectionHandle, &RawEvent) + Send + Sync;

/// The shared connection to the monitoring backend.
pub trait Connection: Send + Sync {
    /// Registers `handler` for events matching any of `filters` under `set_id`.
    fn subscribe(
        &self,
        handler: &EventHandler,
        set_id: SubscriptionSetId,
        filters: &[SubscriptionFilter],
    ) -> Result<(), TransportError>;

    /// Removes the subscription set previously registered for `handler`.
    fn unsubscribe(&self, handler: &EventHandler, set_id: SubscriptionSetId) -> Result<(), TransportError>;
}

/// Identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Creates a new random handler id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handler closure with a stable identity.
///
/// Closures cannot be compared, so the transport keys registrations by
/// [`HandlerId`]. Cloning shares the closure and keeps the id.
#[derive(Clone)]
pub struct EventHandler {
    id: HandlerId,
    func: Arc<HandlerFn>,
}

impl EventHandler {
    /// Wraps a closure.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&ConnectionHandle, &RawEvent) + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::new(),
            func: Arc::new(func),
        }
    }

    /// The handler's identity.
    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// Invokes the handler.
    pub fn call(&self, sender: &ConnectionHandle, event: &RawEvent) {
        (self.func)(sender, event);
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").field("id", &self.id).finish_non_exhaustive()
    }
}
