//! Per-key atomic store.
//!
//! Each key owns a list guarded by its own mutex. A read-modify-write of one
//! key's list runs entirely inside that key's section; different keys proceed
//! in parallel. Callers may perform blocking transport calls inside the
//! section.
//!
//! Key invariants:
//! - A list left empty after an action is pruned from the map.
//! - `act_and_remove` retires the slot; a caller that fetched the slot just
//!   before retirement retries against the map instead of mutating an orphan.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug)]
struct Slot<V> {
    items: Vec<V>,
    retired: bool,
}

impl<V> Slot<V> {
    const fn new() -> Self {
        Self {
            items: Vec::new(),
            retired: false,
        }
    }
}

/// Keyed collection of lists with per-key serialized actions.
#[derive(Debug)]
pub struct KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    slots: DashMap<K, Arc<Mutex<Slot<V>>>>,
}

impl<K, V> Default for KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Runs `f` on the list under `key`. Returns `None` if the key is absent.
    pub fn get_and_act<R>(&self, key: &K, f: impl FnOnce(&mut Vec<V>) -> R) -> Option<R> {
        loop {
            let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
            let mut guard = slot.lock();
            if guard.retired {
                drop(guard);
                self.unlink(key, &slot);
                continue;
            }
            let out = f(&mut guard.items);
            if guard.items.is_empty() {
                guard.retired = true;
                drop(guard);
                self.unlink(key, &slot);
            }
            return Some(out);
        }
    }

    /// Ensures `key` exists, then runs `f` on its list.
    pub fn get_or_add_and_act<R>(&self, key: &K, f: impl FnOnce(&mut Vec<V>) -> R) -> R {
        loop {
            let slot = Arc::clone(
                self.slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::new())))
                    .value(),
            );
            let mut guard = slot.lock();
            if guard.retired {
                drop(guard);
                self.unlink(key, &slot);
                continue;
            }
            let out = f(&mut guard.items);
            if guard.items.is_empty() {
                guard.retired = true;
                drop(guard);
                self.unlink(key, &slot);
            }
            return out;
        }
    }

    /// Runs `f` on the list under `key`, then removes the key regardless of
    /// what `f` did. Returns `None` if the key is absent.
    pub fn act_and_remove<R>(&self, key: &K, f: impl FnOnce(&mut Vec<V>) -> R) -> Option<R> {
        loop {
            let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
            let mut guard = slot.lock();
            if guard.retired {
                drop(guard);
                self.unlink(key, &slot);
                continue;
            }
            let out = f(&mut guard.items);
            guard.retired = true;
            guard.items.clear();
            drop(guard);
            self.unlink(key, &slot);
            return Some(out);
        }
    }

    /// Read-only snapshot of the list under `key`.
    pub fn inspect<R>(&self, key: &K, f: impl FnOnce(&[V]) -> R) -> Option<R> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock();
        if guard.retired {
            return None;
        }
        Some(f(&guard.items))
    }

    /// Returns true if `key` holds a live list.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inspect(key, |_| ()).is_some()
    }

    /// Snapshot of all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    fn unlink(&self, key: &K, slot: &Arc<Mutex<Slot<V>>>) {
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }
}
