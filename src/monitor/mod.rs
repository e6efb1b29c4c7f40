//! Monitors: typed change notifications on top of the subscription registry.
//!
//! A [`Monitor`] pairs an owning [`MonitorSource`] with a [`ChangeMatcher`]
//! describing one change category. Starting a monitor installs its record
//! (plus lifecycle cleanup records) in the registry; raw events flowing back
//! from the transport are matched, deduplicated and handed to the callback
//! as [`ChangeEvent`]s.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::{ElementId, ResourceRef};
use crate::transport::ConnectionHandle;

/// Monitor lifecycle and event handling.
pub mod base;
/// Cleanup records wired to resource lifecycle events.
pub mod cleanup;
/// Matcher trait and dedup gate.
pub mod matcher;
/// Channel-backed change stream.
pub mod stream;
/// Incremental table row cache.
pub mod table_cache;

/// Alarm level of a parameter or cell.
pub mod alarm;
/// Table cell values.
pub mod cell;
/// Element names.
pub mod name;
/// Standalone parameter values.
pub mod param;
/// Element lifecycle states.
pub mod state;
/// Table row sets.
pub mod table;

pub use alarm::{AlarmLevelMatcher, AlarmTarget};
pub use base::Monitor;
pub use cell::CellValueMatcher;
pub use matcher::{ChangeMatcher, DedupGate, Matched};
pub use name::ElementNameMatcher;
pub use param::ParamValueMatcher;
pub use state::ElementStateMatcher;
pub use stream::MonitorStream;
pub use table::{TableChange, TableMatcher};
pub use table_cache::{TableCache, TableDelta};

/// Monitor on element lifecycle states.
pub type ElementStateMonitor = Monitor<ElementStateMatcher>;
/// Monitor on element names.
pub type ElementNameMonitor = Monitor<ElementNameMatcher>;
/// Monitor on a standalone parameter, delivering values as `T`.
pub type ParamValueMonitor<T> = Monitor<ParamValueMatcher<T>>;
/// Monitor on a table cell, delivering values as `T`.
pub type CellValueMonitor<T> = Monitor<CellValueMatcher<T>>;
/// Monitor on the alarm level of a parameter or cell.
pub type AlarmLevelMonitor = Monitor<AlarmLevelMatcher>;
/// Monitor on the row set of a table.
pub type TableMonitor = Monitor<TableMatcher>;

/// The logical owner of a set of subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitorSource {
    /// A bare identifier chosen by the caller.
    Identifier(String),
    /// A monitored element; its stop or deletion tears the scope down.
    Element(ElementId),
}

impl MonitorSource {
    /// Key of the registry scope owned by this source.
    #[must_use]
    pub fn source_id(&self) -> String {
        match self {
            Self::Identifier(id) => id.clone(),
            Self::Element(element) => element.to_string(),
        }
    }

    /// The owning element, if the source is one.
    #[must_use]
    pub const fn element(&self) -> Option<ElementId> {
        match self {
            Self::Identifier(_) => None,
            Self::Element(element) => Some(*element),
        }
    }
}

impl From<&str> for MonitorSource {
    fn from(id: &str) -> Self {
        Self::Identifier(id.to_string())
    }
}

impl From<ElementId> for MonitorSource {
    fn from(element: ElementId) -> Self {
        Self::Element(element)
    }
}

/// A delivered change.
#[derive(Clone)]
pub struct ChangeEvent<C> {
    /// Unique id of this delivery.
    pub event_id: Uuid,
    /// The resource that changed.
    pub resource: ResourceRef,
    /// Scope that owns the subscription.
    pub source_id: String,
    /// Connection the event arrived on, for further queries.
    pub connection: ConnectionHandle,
    /// The newly observed value.
    pub value: C,
    /// When the change was matched.
    pub timestamp: DateTime<Utc>,
}

impl<C> ChangeEvent<C> {
    pub(crate) fn new(resource: ResourceRef, source_id: String, connection: ConnectionHandle, value: C) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            resource,
            source_id,
            connection,
            value,
            timestamp: Utc::now(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for ChangeEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("event_id", &self.event_id)
            .field("resource", &self.resource)
            .field("source_id", &self.source_id)
            .field("value", &self.value)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}
