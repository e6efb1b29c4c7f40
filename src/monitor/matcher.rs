//! Matcher trait for the monitor subsystem.
//!
//! A matcher describes one change category: which filters to register, how a
//! raw payload maps to an identity and a value, and which cache key dedups it.
//! Matchers are pure apart from the [`DedupGate`] they are handed.

use std::fmt;

use crate::error::MatchError;
use crate::event::{EventPayload, SubscriptionFilter, SubscriptionSetId};
use crate::identity::{ElementId, ResourceRef};
use crate::registry::{CachedValue, SubscriptionRegistry};

/// A change that passed identity matching and the dedup gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Matched<C> {
    /// The resource that changed.
    pub resource: ResourceRef,
    /// The change payload.
    pub change: C,
}

impl<C> Matched<C> {
    /// Creates a match.
    pub const fn new(resource: ResourceRef, change: C) -> Self {
        Self { resource, change }
    }
}

/// One change category.
pub trait ChangeMatcher: Send + Sync + 'static {
    /// Change payload delivered to callbacks.
    type Change: Clone + fmt::Debug + Send + 'static;

    /// Suffix distinguishing subscriptions on the same selection, e.g. `-Value`.
    fn role_suffix(&self) -> &'static str;

    /// Display form of the watched selection, used in record ids.
    fn selection(&self) -> String;

    /// Element the subscription's data concerns; `None` for wildcards.
    fn destination(&self) -> Option<ElementId>;

    /// Filters to register with the transport.
    fn filters(&self) -> Vec<SubscriptionFilter>;

    /// Matches a payload.
    ///
    /// Returns `Ok(None)` for payloads of other types, other identities, and
    /// values the gate reports as unchanged.
    fn evaluate(
        &self,
        payload: &EventPayload,
        gate: &DedupGate<'_>,
    ) -> Result<Option<Matched<Self::Change>>, MatchError>;
}

/// Access to one record's dedup cache.
///
/// The gate is bound to the subscription set the record was installed with.
/// Once the record is replaced, every check reports the value as unchanged.
pub struct DedupGate<'a> {
    registry: &'a SubscriptionRegistry,
    source_id: &'a str,
    record_id: &'a str,
    set_id: SubscriptionSetId,
}

impl<'a> DedupGate<'a> {
    /// Binds the gate to one record and its subscription set.
    #[must_use]
    pub const fn new(
        registry: &'a SubscriptionRegistry,
        source_id: &'a str,
        record_id: &'a str,
        set_id: SubscriptionSetId,
    ) -> Self {
        Self {
            registry,
            source_id,
            record_id,
            set_id,
        }
    }

    /// Returns true if `value` differs from the last value under `key`.
    #[must_use]
    pub fn replace_if_different(&self, key: &str, value: CachedValue) -> bool {
        let changed = self
            .registry
            .replace_if_current(self.source_id, self.record_id, self.set_id, key, value)
            .is_changed();
        if !changed {
            tracing::debug!(record_id = self.record_id, cache_key = key, "unchanged value suppressed");
        }
        changed
    }

    /// Runs `f` on the cache slot under `key`; `None` if the record is gone
    /// or replaced.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Option<CachedValue>) -> R) -> Option<R> {
        self.registry
            .update_cache_if_current(self.source_id, self.record_id, self.set_id, key, f)
    }

    /// The record this gate is bound to.
    #[must_use]
    pub const fn record_id(&self) -> &str {
        self.record_id
    }
}
