//! Per-peer outbox of entries awaiting replication

use dynamo_core::frontier;
use dynamo_core::ObjectEntry;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Pending replication for one peer: key -> entries in delivery order.
///
/// Each outbox has its own lock, so different peers never contend.
#[derive(Default)]
pub struct Gossiper {
    queues: Mutex<HashMap<String, Vec<ObjectEntry>>>,
}

impl Gossiper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `entry` for `key`.
    ///
    /// Queued versions the new entry descends from are dropped (the peer only
    /// needs the newest), concurrent ones stay ahead of it, and an entry that
    /// is stale or already queued is ignored.
    pub fn append(&self, key: &str, entry: ObjectEntry) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(key.to_string()).or_default();
        // Stale or duplicate entries are simply not queued
        let _ = frontier::insert_entry(queue, entry, key);
    }

    /// Oldest pending entry for `key`
    pub fn front(&self, key: &str) -> Option<ObjectEntry> {
        self.queues
            .lock()
            .get(key)
            .and_then(|queue| queue.first().cloned())
    }

    /// Remove a delivered entry, pruning the key once its queue drains.
    ///
    /// Returns false if the entry was no longer queued (superseded meanwhile).
    pub fn consume_entry(&self, key: &str, delivered: &ObjectEntry) -> bool {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(key) else {
            return false;
        };
        let removed = match queue.iter().position(|entry| entry == delivered) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        };
        if queue.is_empty() {
            queues.remove(key);
        }
        removed
    }

    /// Entries pending for `key`, in delivery order
    pub fn pending(&self, key: &str) -> Vec<ObjectEntry> {
        self.queues.lock().get(key).cloned().unwrap_or_default()
    }

    /// Total pending entries across keys
    pub fn pending_count(&self) -> usize {
        self.queues.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }
}
