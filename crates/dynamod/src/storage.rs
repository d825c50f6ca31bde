//! In-memory versioned key/value store

use dynamo_core::frontier::{self, Insertion};
use dynamo_core::{ObjectEntry, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Local store: key -> causal frontier of that key's versions
#[derive(Default)]
pub struct Storage {
    entries: RwLock<HashMap<String, Vec<ObjectEntry>>>,
}

impl Storage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a version of `key` into its frontier.
    ///
    /// The whole read-modify-write runs under the store's write lock, so
    /// concurrent writers to one key cannot lose each other's updates.
    pub fn put(&self, key: &str, entry: ObjectEntry) -> Result<Insertion> {
        let mut entries = self.entries.write();
        let versions = entries.entry(key.to_string()).or_default();
        frontier::insert_entry(versions, entry, key)
    }

    /// Current versions of `key` (empty if never written)
    pub fn get(&self, key: &str) -> Vec<ObjectEntry> {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    /// Snapshot of every stored key
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Count keys
    pub fn key_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Count versions across all keys
    pub fn entry_count(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }
}
