use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{MonitorResult, TransportError};
use crate::event::SubscriptionSetId;
use crate::registry::SubscriptionRegistry;

use super::ChangeEvent;

/// A bounded stream of changes from one monitor.
///
/// Dropping this stream attempts best-effort unregistration. A stream only
/// ever removes the subscription set it was created with, so a stale stream
/// never tears down a restarted monitor.
pub struct MonitorStream<C> {
    rx: Receiver<ChangeEvent<C>>,
    dropped: Arc<AtomicU64>,
    registry: Weak<SubscriptionRegistry>,
    source_id: String,
    record_id: String,
    set_id: SubscriptionSetId,
    unregistered: AtomicBool,
}

impl<C> MonitorStream<C> {
    pub(crate) fn new(
        rx: Receiver<ChangeEvent<C>>,
        dropped: Arc<AtomicU64>,
        registry: Weak<SubscriptionRegistry>,
        source_id: String,
        record_id: String,
        set_id: SubscriptionSetId,
    ) -> Self {
        Self {
            rx,
            dropped,
            registry,
            source_id,
            record_id,
            set_id,
            unregistered: AtomicBool::new(false),
        }
    }

    /// Id of the subscription record feeding this stream.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Number of changes dropped because the stream was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Explicit unregistration.
    ///
    /// Idempotent. Changes already queued stay readable; the stream reports
    /// disconnection once they are drained.
    pub fn unsubscribe(&self) -> MonitorResult<()> {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        if !registry.remove_if_set(&self.source_id, &self.record_id, self.set_id)? {
            tracing::debug!(
                record_id = %self.record_id,
                set_id = %self.set_id,
                "stream subscription already replaced"
            );
            return Ok(());
        }
        registry.try_remove_cleanup_only(&self.source_id)
    }

    /// Receive the next change (blocking).
    pub fn recv(&self) -> MonitorResult<ChangeEvent<C>> {
        self.rx.recv().map_err(|_| disconnected().into())
    }

    /// Receive the next change with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> MonitorResult<ChangeEvent<C>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TransportError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }
            .into(),
            RecvTimeoutError::Disconnected => disconnected().into(),
        })
    }

    /// Receive a change if one is queued.
    pub fn try_recv(&self) -> MonitorResult<Option<ChangeEvent<C>>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected().into()),
        }
    }
}

fn disconnected() -> TransportError {
    TransportError::Disconnected {
        path: "monitor_stream".to_string(),
    }
}

impl<C> Drop for MonitorStream<C> {
    fn drop(&mut self) {
        if let Err(e) = self.unsubscribe() {
            tracing::warn!(record_id = %self.record_id, error = %e, "stream unregistration failed");
        }
    }
}
