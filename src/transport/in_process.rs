//! In-process transport.
//!
//! Keeps subscription sets in memory, evaluates their filters against published
//! payloads and delivers matches to handlers either inline on the publishing
//! thread or on a bounded worker pool. Used for embedding, tests and benchmarks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::error::TransportError;
use crate::event::{EventPayload, RawEvent, SubscriptionFilter, SubscriptionSetId};

use super::{Connection, ConnectionHandle, EventHandler, HandlerId};

/// Configuration for [`InProcessConnection`].
#[derive(Debug, Clone)]
pub struct InProcessConfig {
    /// Dispatch worker threads. Zero dispatches inline on the publisher's thread.
    pub dispatch_workers: usize,
    /// Max queued deliveries before publish drops them.
    pub queue_capacity: usize,
}

impl Default for InProcessConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: 0,
            queue_capacity: 1024,
        }
    }
}

struct Registration {
    handler: EventHandler,
    filters: Vec<SubscriptionFilter>,
}

struct Delivery {
    handler: EventHandler,
    sender: ConnectionHandle,
    event: RawEvent,
}

struct DispatchPool {
    tx: Sender<Delivery>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl DispatchPool {
    fn start(workers: usize, queue_capacity: usize) -> Result<Self, TransportError> {
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Delivery>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Delivery> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("monitorkit-dispatch-{idx}"))
                .spawn(move || {
                    while let Ok(Delivery { handler, sender, event }) = rx.recv() {
                        let call = std::panic::AssertUnwindSafe(|| handler.call(&sender, &event));
                        if std::panic::catch_unwind(call).is_err() {
                            tracing::error!(handler = %handler.id(), set_id = %event.set_id, "handler panicked");
                        }
                    }
                })
                .map_err(|e| TransportError::Disconnected {
                    path: format!("dispatch worker spawn failed: {e}"),
                })?;
            handles.push(handle);
        }

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity,
        })
    }
}

/// In-memory [`Connection`] with filter evaluation and fan-out dispatch.
pub struct InProcessConnection {
    me: Weak<InProcessConnection>,
    subscriptions: RwLock<HashMap<(HandlerId, SubscriptionSetId), Registration>>,
    pool: Mutex<Option<DispatchPool>>,
    subscribe_calls: AtomicU64,
    unsubscribe_calls: AtomicU64,
    dropped_deliveries: AtomicU64,
}

impl InProcessConnection {
    /// Creates a connection. Spawns dispatch workers when configured.
    pub fn new(config: InProcessConfig) -> Result<Arc<Self>, TransportError> {
        let pool = if config.dispatch_workers == 0 {
            None
        } else {
            Some(DispatchPool::start(config.dispatch_workers, config.queue_capacity)?)
        };

        Ok(Self::with_pool(pool))
    }

    /// Creates an inline-dispatch connection.
    #[must_use]
    pub fn inline() -> Arc<Self> {
        Self::with_pool(None)
    }

    fn with_pool(pool: Option<DispatchPool>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            subscriptions: RwLock::new(HashMap::new()),
            pool: Mutex::new(pool),
            subscribe_calls: AtomicU64::new(0),
            unsubscribe_calls: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
        })
    }

    /// Publishes a payload to every subscription set with a matching filter.
    ///
    /// Returns the number of deliveries made (or queued). Handlers are
    /// snapshotted first, so a handler may unsubscribe while being dispatched.
    pub fn publish(&self, payload: EventPayload) -> Result<usize, TransportError> {
        let sender: ConnectionHandle = self.me.upgrade().ok_or_else(|| TransportError::Disconnected {
            path: "in_process".to_string(),
        })?;

        let targets: Vec<(EventHandler, SubscriptionSetId)> = {
            let subs = self.subscriptions.read();
            subs.iter()
                .filter(|(_, reg)| reg.filters.iter().any(|f| f.matches(&payload)))
                .map(|((_, set_id), reg)| (reg.handler.clone(), *set_id))
                .collect()
        };

        let queue = self
            .pool
            .lock()
            .as_ref()
            .map(|pool| (pool.tx.clone(), pool.queue_capacity));

        let mut delivered = 0usize;
        for (handler, set_id) in targets {
            let event = RawEvent::new(set_id, payload.clone());
            match &queue {
                None => {
                    handler.call(&sender, &event);
                    delivered += 1;
                }
                Some((tx, capacity)) => match tx.try_send(Delivery {
                    handler,
                    sender: Arc::clone(&sender),
                    event,
                }) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            capacity = *capacity,
                            set_id = %set_id,
                            "dispatch queue full, delivery dropped"
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        return Err(TransportError::Disconnected {
                            path: "in_process_dispatch".to_string(),
                        });
                    }
                },
            }
        }
        Ok(delivered)
    }

    /// Number of subscribe calls received.
    #[must_use]
    pub fn subscribe_calls(&self) -> u64 {
        self.subscribe_calls.load(Ordering::Relaxed)
    }

    /// Number of unsubscribe calls received.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> u64 {
        self.unsubscribe_calls.load(Ordering::Relaxed)
    }

    /// Number of deliveries dropped because the dispatch queue was full.
    #[must_use]
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped_deliveries.load(Ordering::Relaxed)
    }

    /// Number of live subscription sets.
    #[must_use]
    pub fn active_sets(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Returns true if a set with this id is live.
    #[must_use]
    pub fn is_subscribed(&self, set_id: SubscriptionSetId) -> bool {
        self.subscriptions.read().keys().any(|(_, s)| *s == set_id)
    }

    /// Stops the dispatch workers after they drain queued deliveries.
    pub fn shutdown(&self) {
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            drop(pool.tx);
            let current = thread::current().id();
            for handle in pool.workers {
                if handle.thread().id() != current {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl Connection for InProcessConnection {
    fn subscribe(
        &self,
        handler: &EventHandler,
        set_id: SubscriptionSetId,
        filters: &[SubscriptionFilter],
    ) -> Result<(), TransportError> {
        self.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        if filters.is_empty() {
            return Err(TransportError::SubscribeFailed {
                set_id: set_id.to_string(),
                message: "no filters".to_string(),
            });
        }
        self.subscriptions.write().insert(
            (handler.id(), set_id),
            Registration {
                handler: handler.clone(),
                filters: filters.to_vec(),
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, handler: &EventHandler, set_id: SubscriptionSetId) -> Result<(), TransportError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().remove(&(handler.id(), set_id));
        Ok(())
    }
}

impl Drop for InProcessConnection {
    fn drop(&mut self) {
        // Detach rather than join: the last handle may be dropped on a worker.
        if let Some(pool) = self.pool.get_mut().take() {
            drop(pool.tx);
            drop(pool.workers);
        }
    }
}
