//! Subscription registry.
//!
//! Owns every subscription record, grouped into scopes keyed by the source
//! identifier that requested them, and wires records onto the shared
//! transport. All operations on one scope are mutually exclusive; operations
//! on different scopes run in parallel.
//!
//! # Blocking inside the section
//!
//! `create`, `remove`, `remove_by_destination`, `remove_all` and
//! `try_remove_cleanup_only` call the transport while holding the scope's
//! section, so a concurrent create/remove on the same scope cannot interleave
//! with an in-flight subscribe or unsubscribe. Transport failures propagate
//! and are never retried.

use std::collections::HashSet;

use crate::error::{ContractError, MonitorError, MonitorResult};
use crate::event::SubscriptionSetId;
use crate::identity::ElementId;
use crate::transport::ConnectionHandle;

/// Subscription records and cache values.
pub mod record;
/// Per-key atomic store.
pub mod store;

pub use record::{CachedValue, RecordKind, Replaced, SubscriptionRecord};
pub use store::KeyedStore;

/// Registry of active subscriptions, grouped by source identifier.
pub struct SubscriptionRegistry {
    scopes: KeyedStore<String, SubscriptionRecord>,
    connection: ConnectionHandle,
}

impl SubscriptionRegistry {
    /// Creates an empty registry driving `connection`.
    #[must_use]
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            scopes: KeyedStore::new(),
            connection,
        }
    }

    /// The shared connection.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Adds `record` to the scope and subscribes it on the transport.
    ///
    /// If a record with the same id exists, the new record is discarded unless
    /// `overwrite` is set, in which case the old one is unsubscribed first.
    /// Returns true if `record` was installed.
    pub fn create(&self, source_id: &str, record: SubscriptionRecord, overwrite: bool) -> MonitorResult<bool> {
        self.scopes.get_or_add_and_act(&source_id.to_string(), |records| -> MonitorResult<bool> {
            if let Some(pos) = records.iter().position(|r| r.id == record.id) {
                if !overwrite {
                    tracing::debug!(source_id, record_id = %record.id, "record exists, keeping current");
                    return Ok(false);
                }
                self.unsubscribe(source_id, &records[pos])?;
                records.remove(pos);
            }

            self.connection
                .subscribe(&record.handler, record.set_id, &record.filters)?;
            tracing::debug!(
                source_id,
                record_id = %record.id,
                set_id = %record.set_id,
                kind = ?record.kind,
                filters = record.filters.len(),
                "subscribed"
            );
            records.push(record);
            Ok(true)
        })
    }

    /// Unsubscribes and removes the record with `record_id`.
    ///
    /// A missing record is a contract violation unless `force` is set.
    pub fn remove(&self, source_id: &str, record_id: &str, force: bool) -> MonitorResult<()> {
        let outcome = self.scopes.get_and_act(&source_id.to_string(), |records| -> MonitorResult<bool> {
            let Some(pos) = records.iter().position(|r| r.id == record_id) else {
                return Ok(false);
            };
            self.unsubscribe(source_id, &records[pos])?;
            records.remove(pos);
            Ok(true)
        });

        match outcome {
            Some(Ok(true)) => Ok(()),
            Some(Err(e)) => Err(e),
            Some(Ok(false)) | None if force => Ok(()),
            Some(Ok(false)) | None => Err(ContractError::SubscriptionNotFound {
                source_id: source_id.to_string(),
                record_id: record_id.to_string(),
            }
            .into()),
        }
    }

    /// Unsubscribes and removes the record with `record_id` if it still
    /// carries `set_id`.
    ///
    /// Returns false, without touching anything, when the record is absent
    /// or has been replaced by a newer subscription.
    pub fn remove_if_set(
        &self,
        source_id: &str,
        record_id: &str,
        set_id: SubscriptionSetId,
    ) -> MonitorResult<bool> {
        let outcome = self.scopes.get_and_act(&source_id.to_string(), |records| -> MonitorResult<bool> {
            let Some(pos) = records
                .iter()
                .position(|r| r.id == record_id && r.set_id == set_id)
            else {
                return Ok(false);
            };
            self.unsubscribe(source_id, &records[pos])?;
            records.remove(pos);
            Ok(true)
        });
        outcome.unwrap_or(Ok(false))
    }

    /// Removes every record whose destination is `destination`.
    ///
    /// If only cleanup records remain afterwards, they are torn down too and
    /// the scope disappears. Returns the number of records removed.
    pub fn remove_by_destination(&self, source_id: &str, destination: ElementId) -> MonitorResult<usize> {
        let outcome = self.scopes.get_and_act(&source_id.to_string(), |records| {
            let (mut removed, mut failure) =
                self.unsubscribe_where(source_id, records, |r| r.destination == Some(destination));

            if !records.iter().any(SubscriptionRecord::is_normal) {
                let (rest, err) = self.unsubscribe_where(source_id, records, |_| true);
                removed += rest;
                failure = failure.or(err);
            }

            failure.map_or(Ok(removed), Err)
        });
        outcome.unwrap_or(Ok(0))
    }

    /// Tears down every record in the scope and deletes the scope.
    ///
    /// The scope is deleted even if some unsubscribe calls fail; the first
    /// failure is returned.
    pub fn remove_all(&self, source_id: &str) -> MonitorResult<usize> {
        let outcome = self.scopes.act_and_remove(&source_id.to_string(), |records| {
            let (removed, failure) = self.unsubscribe_where(source_id, records, |_| true);
            failure.map_or(Ok(removed), Err)
        });
        outcome.unwrap_or(Ok(0))
    }

    /// Dedup gate: stores `value` under `cache_key` unless it equals the
    /// cached one.
    ///
    /// A record that no longer exists reports [`Replaced::Unchanged`], so
    /// nothing is delivered after a subscription is stopped.
    pub fn replace_if_different(
        &self,
        source_id: &str,
        record_id: &str,
        cache_key: &str,
        value: CachedValue,
    ) -> Replaced {
        self.with_cache_slot(source_id, record_id, None, cache_key, |slot| replace_slot(slot, value))
            .unwrap_or(Replaced::Unchanged)
    }

    /// Like [`replace_if_different`](Self::replace_if_different), but only
    /// while the record still carries `set_id`.
    ///
    /// A record replaced by a newer subscription reports
    /// [`Replaced::Unchanged`] to events queued for the old one.
    pub fn replace_if_current(
        &self,
        source_id: &str,
        record_id: &str,
        set_id: SubscriptionSetId,
        cache_key: &str,
        value: CachedValue,
    ) -> Replaced {
        self.with_cache_slot(source_id, record_id, Some(set_id), cache_key, |slot| {
            replace_slot(slot, value)
        })
        .unwrap_or(Replaced::Unchanged)
    }

    /// Runs `f` on the cache slot under `cache_key` of one record.
    ///
    /// Returns `None` if the record does not exist.
    pub fn update_cache<R>(
        &self,
        source_id: &str,
        record_id: &str,
        cache_key: &str,
        f: impl FnOnce(&mut Option<CachedValue>) -> R,
    ) -> Option<R> {
        self.with_cache_slot(source_id, record_id, None, cache_key, f)
    }

    /// Runs `f` on the cache slot under `cache_key` of one record, provided
    /// the record still carries `set_id`.
    ///
    /// Returns `None` if the record does not exist or was replaced.
    pub fn update_cache_if_current<R>(
        &self,
        source_id: &str,
        record_id: &str,
        set_id: SubscriptionSetId,
        cache_key: &str,
        f: impl FnOnce(&mut Option<CachedValue>) -> R,
    ) -> Option<R> {
        self.with_cache_slot(source_id, record_id, Some(set_id), cache_key, f)
    }

    /// Removes cleanup records that no longer guard any normal record.
    ///
    /// Per destination, cleanup records go once no normal record targets that
    /// destination. If the scope has no normal record left, the whole scope
    /// is removed.
    pub fn try_remove_cleanup_only(&self, source_id: &str) -> MonitorResult<()> {
        let outcome = self.scopes.get_and_act(&source_id.to_string(), |records| {
            let any_normal = records.iter().any(SubscriptionRecord::is_normal);
            let targeted: HashSet<ElementId> = records
                .iter()
                .filter(|r| r.is_normal())
                .filter_map(|r| r.destination)
                .collect();

            let (_, failure) = self.unsubscribe_where(source_id, records, |r| {
                if r.is_normal() {
                    return false;
                }
                if !any_normal {
                    return true;
                }
                r.destination.is_some_and(|d| !targeted.contains(&d))
            });
            failure.map_or(Ok(()), Err)
        });
        outcome.unwrap_or(Ok(()))
    }

    /// Returns true if the scope exists.
    #[must_use]
    pub fn contains_scope(&self, source_id: &str) -> bool {
        self.scopes.contains_key(&source_id.to_string())
    }

    /// Number of records in the scope (0 if absent).
    #[must_use]
    pub fn scope_len(&self, source_id: &str) -> usize {
        self.scopes
            .inspect(&source_id.to_string(), <[SubscriptionRecord]>::len)
            .unwrap_or(0)
    }

    /// Number of normal records in the scope.
    #[must_use]
    pub fn normal_count(&self, source_id: &str) -> usize {
        self.scopes
            .inspect(&source_id.to_string(), |records| {
                records.iter().filter(|r| r.is_normal()).count()
            })
            .unwrap_or(0)
    }

    /// Ids of the records in the scope, in insertion order.
    #[must_use]
    pub fn record_ids(&self, source_id: &str) -> Vec<String> {
        self.scopes
            .inspect(&source_id.to_string(), |records| {
                records.iter().map(|r| r.id.clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Cached value of one record.
    #[must_use]
    pub fn cached(&self, source_id: &str, record_id: &str, cache_key: &str) -> Option<CachedValue> {
        self.scopes
            .inspect(&source_id.to_string(), |records| {
                records
                    .iter()
                    .find(|r| r.id == record_id)
                    .and_then(|r| r.cached(cache_key).cloned())
            })
            .flatten()
    }

    /// Snapshot of all live source identifiers.
    #[must_use]
    pub fn source_ids(&self) -> Vec<String> {
        self.scopes.keys()
    }

    fn with_cache_slot<R>(
        &self,
        source_id: &str,
        record_id: &str,
        set_id: Option<SubscriptionSetId>,
        cache_key: &str,
        f: impl FnOnce(&mut Option<CachedValue>) -> R,
    ) -> Option<R> {
        self.scopes
            .get_and_act(&source_id.to_string(), |records| {
                let record = records
                    .iter_mut()
                    .find(|r| r.id == record_id && set_id.map_or(true, |s| r.set_id == s))?;
                let mut slot = record.cache.remove(cache_key);
                let out = f(&mut slot);
                if let Some(value) = slot {
                    record.cache.insert(cache_key.to_string(), value);
                }
                Some(out)
            })
            .flatten()
    }

    fn unsubscribe(&self, source_id: &str, record: &SubscriptionRecord) -> MonitorResult<()> {
        self.connection.unsubscribe(&record.handler, record.set_id)?;
        tracing::debug!(
            source_id,
            record_id = %record.id,
            set_id = %record.set_id,
            kind = ?record.kind,
            "unsubscribed"
        );
        Ok(())
    }

    /// Unsubscribes and drops records matching `pred`. Records whose
    /// unsubscribe fails stay in place; the first failure is returned.
    fn unsubscribe_where(
        &self,
        source_id: &str,
        records: &mut Vec<SubscriptionRecord>,
        pred: impl Fn(&SubscriptionRecord) -> bool,
    ) -> (usize, Option<MonitorError>) {
        let mut removed = 0usize;
        let mut failure: Option<MonitorError> = None;
        records.retain(|r| {
            if !pred(r) {
                return true;
            }
            match self.unsubscribe(source_id, r) {
                Ok(()) => {
                    removed += 1;
                    false
                }
                Err(e) => {
                    tracing::warn!(source_id, record_id = %r.id, error = %e, "unsubscribe failed");
                    failure.get_or_insert(e);
                    true
                }
            }
        });
        (removed, failure)
    }
}

fn replace_slot(slot: &mut Option<CachedValue>, value: CachedValue) -> Replaced {
    if slot.as_ref() == Some(&value) {
        Replaced::Unchanged
    } else {
        *slot = Some(value);
        Replaced::Changed
    }
}
