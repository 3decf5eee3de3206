//! Correlation registry: tracks requests waiting for a peer reply.
//!
//! The [`CorrelationRegistry`] maps a correlation id to the waiter of one
//! in-flight request. It is the single mutation point for insert, resolve and
//! remove, and is shared between the peer read loop and every concurrent
//! forwarder.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// One outstanding request.
struct PendingEntry {
    /// `None` once the entry has been resolved.
    waiter: Option<oneshot::Sender<String>>,
    created_at: Instant,
}

/// Lifetime counters for the registry.
#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    resolved: AtomicU64,
    removed: AtomicU64,
    stale_replies: AtomicU64,
}

/// Point-in-time copy of the registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries currently pending.
    pub pending: usize,
    /// Entries ever registered.
    pub registered: u64,
    /// Replies delivered to a waiter.
    pub resolved: u64,
    /// Entries removed (any terminal outcome).
    pub removed: u64,
    /// Replies for unknown, resolved or abandoned ids.
    pub stale_replies: u64,
}

/// Thread-safe map of correlation id → pending waiter.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<String, PendingEntry>,
    counters: Counters,
}

impl CorrelationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh unresolved entry under a new unique id.
    ///
    /// The receiver completes when [`resolve`](Self::resolve) is called for
    /// the id, and errors if the entry is removed first.
    pub fn register(&self) -> (String, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        let mut waiter = Some(tx);
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.pending.entry(id.clone()) {
                slot.insert(PendingEntry {
                    waiter: waiter.take(),
                    created_at: Instant::now(),
                });
                self.counters.registered.fetch_add(1, Ordering::Relaxed);
                debug!(id = %id, "Registered pending request");
                return (id, rx);
            }
        }
    }

    /// Deliver `content` to the waiter for `id`.
    ///
    /// Returns `false` without side effects when the id is unknown, was
    /// already resolved, or its caller has gone away. Duplicate and late
    /// replies are expected, so none of these are errors.
    pub fn resolve(&self, id: &str, content: String) -> bool {
        let taken = self
            .pending
            .get_mut(id)
            .map(|mut entry| (entry.waiter.take(), entry.created_at.elapsed()));
        let (waiter, age) = match taken {
            Some((Some(waiter), age)) => (waiter, age),
            Some((None, _)) => return self.stale(id, "already resolved"),
            None => return self.stale(id, "unknown id"),
        };

        if waiter.send(content).is_err() {
            return self.stale(id, "caller gone");
        }
        self.counters.resolved.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, elapsed_ms = age.as_millis() as u64, "Resolved pending request");
        true
    }

    /// Delete the entry for `id`. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.pending.remove(id).is_some();
        if removed {
            self.counters.removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every pending entry; their waiters observe a closed channel.
    pub fn clear(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.counters
            .removed
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Whether `id` is currently pending.
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            pending: self.pending.len(),
            registered: self.counters.registered.load(Ordering::Relaxed),
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
            stale_replies: self.counters.stale_replies.load(Ordering::Relaxed),
        }
    }

    fn stale(&self, id: &str, reason: &'static str) -> bool {
        self.counters.stale_replies.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, reason, "Discarding stale reply");
        false
    }
}
