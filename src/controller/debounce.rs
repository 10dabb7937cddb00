//! Per-key trailing debouncer
//!
//! Each key has at most one pending delayed task. Scheduling again for the
//! same key cancels the pending task and starts a fresh delay carrying the
//! new value, so only the last value inside a quiet window is delivered.
//! Keys never share a timer. A task that already started delivering is never
//! aborted; deliveries for one key run one at a time behind a per-key gate,
//! and `exclusive` lets a caller wait out a running delivery.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

/// Action run when a key's quiet window elapses
pub type DebouncedAction<T> = Arc<dyn Fn(String, T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending<T> {
    generation: u64,
    value: T,
    handle: JoinHandle<()>,
}

type Gate = Arc<AsyncMutex<()>>;

struct Inner<T> {
    next_generation: u64,
    pending: HashMap<String, Pending<T>>,
    /// Held for the whole delivery of a key's value
    gates: HashMap<String, Gate>,
}

impl<T> Inner<T> {
    fn gate(&mut self, key: &str) -> Gate {
        self.gates.entry(key.to_string()).or_default().clone()
    }
}

pub struct KeyedDebouncer<T> {
    delay: Duration,
    action: DebouncedAction<T>,
    inner: Arc<Mutex<Inner<T>>>,
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Send + 'static> KeyedDebouncer<T> {
    pub fn new(delay: Duration, action: DebouncedAction<T>) -> Self {
        KeyedDebouncer {
            delay,
            action,
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                pending: HashMap::new(),
                gates: HashMap::new(),
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `value` for `key` after the quiet window
    ///
    /// Returns true when a pending value for the key was replaced.
    pub fn schedule(&self, key: impl Into<String>, value: T) -> bool {
        let key = key.into();
        let mut inner = lock(&self.inner);

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let replaced = match inner.pending.remove(&key) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        };

        let handle = tokio::spawn({
            let inner = self.inner.clone();
            let action = self.action.clone();
            let key = key.clone();
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                // Taken before the value leaves `pending`, so a caller that
                // finds the slot empty can wait on the gate for this delivery
                let gate = lock(&inner).gate(&key);
                let _delivering = gate.lock_owned().await;
                let value = {
                    let mut guard = lock(&inner);
                    // A newer schedule or a cancel owns the slot now
                    match guard.pending.get(&key) {
                        Some(pending) if pending.generation == generation => {
                            guard.pending.remove(&key).map(|pending| pending.value)
                        }
                        _ => None,
                    }
                };
                if let Some(value) = value {
                    action(key, value).await;
                }
            }
        });

        inner.pending.insert(
            key,
            Pending {
                generation,
                value,
                handle,
            },
        );
        replaced
    }

    /// Drop the pending value for `key` without delivering it
    pub fn cancel(&self, key: &str) -> Option<T> {
        let pending = lock(&self.inner).pending.remove(key)?;
        pending.handle.abort();
        Some(pending.value)
    }

    /// Wait for a running delivery of `key` to finish and hold off the next
    ///
    /// Values scheduled while the guard is alive are delivered after it drops.
    pub async fn exclusive(&self, key: &str) -> OwnedMutexGuard<()> {
        let gate = lock(&self.inner).gate(key);
        gate.lock_owned().await
    }

    /// The value waiting for `key`, if any
    pub fn pending_value(&self, key: &str) -> Option<T>
    where
        T: Clone,
    {
        lock(&self.inner)
            .pending
            .get(key)
            .map(|pending| pending.value.clone())
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.inner).pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Deliver every pending value now, skipping the remaining delay
    ///
    /// Also waits for deliveries that were already running. Returns the
    /// number of values delivered by this call.
    pub async fn flush(&self) -> usize {
        let drained: Vec<(String, T)> = {
            let mut inner = lock(&self.inner);
            inner
                .pending
                .drain()
                .map(|(key, pending)| {
                    pending.handle.abort();
                    (key, pending.value)
                })
                .collect()
        };

        let count = drained.len();
        for (key, value) in drained {
            let gate = lock(&self.inner).gate(&key);
            let _delivering = gate.lock_owned().await;
            (self.action)(key, value).await;
        }

        let gates: Vec<Gate> = lock(&self.inner).gates.values().cloned().collect();
        for gate in gates {
            drop(gate.lock().await);
        }
        count
    }
}

impl<T> Drop for KeyedDebouncer<T> {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        for (_, pending) in inner.pending.drain() {
            pending.handle.abort();
        }
    }
}
