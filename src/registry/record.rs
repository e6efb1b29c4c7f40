//! Subscription records and their dedup cache values.

use std::collections::HashMap;

use crate::event::{ElementState, SubscriptionFilter, SubscriptionSetId};
use crate::identity::ElementId;
use crate::monitor::table_cache::TableCache;
use crate::transport::EventHandler;
use crate::value::{AlarmLevel, ParamValue};

/// Whether a record is user-visible or exists only to trigger teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A real subscription delivering changes to a callback.
    Normal,
    /// Observes lifecycle events and tears down other records.
    Cleanup,
}

/// Last delivered value stored under one cache key.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    State(ElementState),
    Name(String),
    Value(ParamValue),
    Alarm(AlarmLevel),
    Table(TableCache),
}

/// Outcome of a dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    /// The value was new or different and has been stored.
    Changed,
    /// The value equals the last delivered one.
    Unchanged,
}

impl Replaced {
    /// Returns true for [`Replaced::Changed`].
    #[must_use]
    pub const fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// One subscription registered against the transport.
///
/// Records compare equal by `id`.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    /// Unique within the owning scope.
    pub id: String,
    /// Normal or cleanup.
    pub kind: RecordKind,
    /// Element the record's data concerns, when it differs per record.
    pub destination: Option<ElementId>,
    /// Transport set the record is registered under.
    pub set_id: SubscriptionSetId,
    /// What the transport forwards to `handler`.
    pub filters: Vec<SubscriptionFilter>,
    /// Invoked by the transport for matching events.
    pub handler: EventHandler,
    pub(crate) cache: HashMap<String, CachedValue>,
}

impl SubscriptionRecord {
    /// Creates a record with an empty cache and a fresh set id.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: RecordKind,
        destination: Option<ElementId>,
        filters: Vec<SubscriptionFilter>,
        handler: EventHandler,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            destination,
            set_id: SubscriptionSetId::new(),
            filters,
            handler,
            cache: HashMap::new(),
        }
    }

    /// Uses a set id chosen by the caller, so the handler can check it.
    #[must_use]
    pub fn with_set_id(mut self, set_id: SubscriptionSetId) -> Self {
        self.set_id = set_id;
        self
    }

    /// Returns true for normal records.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        matches!(self.kind, RecordKind::Normal)
    }

    /// Last delivered value under `key`.
    #[must_use]
    pub fn cached(&self, key: &str) -> Option<&CachedValue> {
        self.cache.get(key)
    }
}

impl PartialEq for SubscriptionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionRecord {}
