//! Monitor lifecycle: record wiring, event handling and callback delivery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::TrySendError;

use crate::error::MonitorResult;
use crate::event::{RawEvent, SubscriptionSetId};
use crate::registry::{RecordKind, SubscriptionRecord, SubscriptionRegistry};
use crate::transport::{ConnectionHandle, EventHandler};

use super::cleanup::{register_destination_cleanup, register_source_cleanup};
use super::matcher::{ChangeMatcher, DedupGate};
use super::stream::MonitorStream;
use super::{ChangeEvent, MonitorSource};

/// A typed subscription owned by one source.
///
/// The record id is derived from the source, the matcher's selection and its
/// role suffix, so two monitors watching the same thing from the same source
/// share one record; starting the second one replaces the first.
///
/// Callbacks run on whatever thread the transport dispatches on. A panicking
/// callback is logged and does not affect other subscriptions.
pub struct Monitor<M: ChangeMatcher> {
    registry: Arc<SubscriptionRegistry>,
    source: MonitorSource,
    source_id: String,
    record_id: String,
    matcher: Arc<M>,
}

impl<M: ChangeMatcher> Monitor<M> {
    /// Creates a monitor. Nothing is subscribed until [`Monitor::start`].
    pub fn new(registry: Arc<SubscriptionRegistry>, source: impl Into<MonitorSource>, matcher: M) -> Self {
        let source = source.into();
        let source_id = source.source_id();
        let record_id = format!("{source_id}-{}{}", matcher.selection(), matcher.role_suffix());
        Self {
            registry,
            source,
            source_id,
            record_id,
            matcher: Arc::new(matcher),
        }
    }

    /// Subscribes and delivers every matched change to `callback`.
    ///
    /// Installs the source cleanup when the source is an element, and a
    /// destination cleanup when the watched element differs from it. Starting
    /// again replaces the previous callback.
    pub fn start<F>(&self, callback: F) -> MonitorResult<()>
    where
        F: Fn(ChangeEvent<M::Change>) + Send + Sync + 'static,
    {
        self.install(callback).map(|_| ())
    }

    /// Installs the record and returns the subscription set it carries.
    fn install<F>(&self, callback: F) -> MonitorResult<SubscriptionSetId>
    where
        F: Fn(ChangeEvent<M::Change>) + Send + Sync + 'static,
    {
        let owner = self.source.element();
        if let Some(owner) = owner {
            register_source_cleanup(&self.registry, &self.source_id, owner)?;
        }
        let destination = self.matcher.destination();
        if let Some(dest) = destination {
            if owner != Some(dest) {
                register_destination_cleanup(&self.registry, &self.source_id, dest)?;
            }
        }

        let set_id = SubscriptionSetId::new();
        let handler = self.handler(set_id, callback);
        let record = SubscriptionRecord::new(
            self.record_id.clone(),
            RecordKind::Normal,
            destination,
            self.matcher.filters(),
            handler,
        )
        .with_set_id(set_id);
        self.registry.create(&self.source_id, record, true)?;

        tracing::debug!(
            source_id = %self.source_id,
            record_id = %self.record_id,
            set_id = %set_id,
            "monitor started"
        );
        Ok(set_id)
    }

    /// Subscribes and delivers changes into a bounded stream.
    ///
    /// Changes arriving while the stream is full are dropped and counted.
    /// Dropping the stream stops the subscription, unless the monitor has
    /// been restarted since.
    pub fn start_stream(&self, capacity: usize) -> MonitorResult<MonitorStream<M::Change>> {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&dropped);
        let record_id = self.record_id.clone();
        let set_id = self.install(move |event| match tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                counter.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(record_id = %record_id, capacity, "monitor stream full, change dropped");
            }
        })?;

        Ok(MonitorStream::new(
            rx,
            dropped,
            Arc::downgrade(&self.registry),
            self.source_id.clone(),
            self.record_id.clone(),
            set_id,
        ))
    }

    /// Removes the subscription, then any cleanup records left guarding
    /// nothing.
    ///
    /// Without `force`, stopping a monitor that is not registered is an error.
    pub fn stop(&self, force: bool) -> MonitorResult<()> {
        self.registry.remove(&self.source_id, &self.record_id, force)?;
        self.registry.try_remove_cleanup_only(&self.source_id)?;
        tracing::debug!(source_id = %self.source_id, record_id = %self.record_id, "monitor stopped");
        Ok(())
    }

    /// Returns true while the subscription record is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry.record_ids(&self.source_id).contains(&self.record_id)
    }

    /// Id of the subscription record.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Key of the owning scope.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// The matcher describing what is watched.
    #[must_use]
    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    fn handler<F>(&self, set_id: SubscriptionSetId, callback: F) -> EventHandler
    where
        F: Fn(ChangeEvent<M::Change>) + Send + Sync + 'static,
    {
        let registry: Weak<SubscriptionRegistry> = Arc::downgrade(&self.registry);
        let matcher = Arc::clone(&self.matcher);
        let source_id = self.source_id.clone();
        let record_id = self.record_id.clone();

        EventHandler::new(move |sender: &ConnectionHandle, event: &RawEvent| {
            if event.set_id != set_id {
                return;
            }
            let Some(registry) = registry.upgrade() else {
                return;
            };

            let gate = DedupGate::new(&registry, &source_id, &record_id, set_id);
            let matched = match matcher.evaluate(&event.payload, &gate) {
                Ok(Some(matched)) => matched,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(
                        record_id = %record_id,
                        error = %e,
                        event = %event.to_log_string(),
                        "event could not be matched"
                    );
                    return;
                }
            };

            let change = ChangeEvent::new(matched.resource, source_id.clone(), Arc::clone(sender), matched.change);
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| callback(change))) {
                tracing::error!(
                    record_id = %record_id,
                    panic = %panic_message(panic.as_ref()),
                    "monitor callback panicked"
                );
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
