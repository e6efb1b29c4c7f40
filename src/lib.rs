//! # monitorkit - Change Notifications over a Shared Transport
//!
//! monitorkit turns a stream of raw backend events into typed, deduplicated
//! change notifications. Callers register monitors on elements, parameters,
//! table cells and tables; the crate keeps the transport subscriptions in
//! sync and tears them down when the watched resources go away.
//!
//! ## Core Concepts
//!
//! - **Scope**: all subscriptions requested by one source identifier
//! - **Record**: one (filters, handler, cache) triple registered on the transport
//! - **Cleanup record**: a record that only watches lifecycle events and tears
//!   other records down
//! - **Monitor**: a typed subscription built from a matcher
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use monitorkit::{InProcessConnection, ParamId, SubscriptionRegistry};
//! use monitorkit::monitor::{Monitor, ParamValueMatcher};
//!
//! let connection = InProcessConnection::inline();
//! let registry = Arc::new(SubscriptionRegistry::new(connection.clone()));
//!
//! let matcher = ParamValueMatcher::<f64>::new(ParamId::new(7, 12, 500))?;
//! let monitor = Monitor::new(registry, "dashboard", matcher);
//! monitor.start(|change| println!("{} -> {}", change.resource, change.value))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod identity;
pub mod value;

// Subscriptions
pub mod monitor;
pub mod registry;
pub mod transport;

// Re-export primary types at crate root for convenience
pub use error::{ContractError, MatchError, MonitorError, MonitorResult, TransportError};
pub use event::{
    ElementState, EventPayload, EventType, RawEvent, SubscriptionFilter, SubscriptionSetId,
};
pub use identity::{CellId, ElementId, ParamId, ResourceRef};
pub use value::{AlarmLevel, FromParamValue, ParamValue, TableRow};

pub use monitor::{ChangeEvent, Monitor, MonitorSource, MonitorStream};
pub use registry::{RecordKind, SubscriptionRecord, SubscriptionRegistry};
pub use transport::{Connection, ConnectionHandle, EventHandler, InProcessConfig, InProcessConnection};
