//! Identity-keyed map with weak keys
//!
//! Entries are keyed by object address and hold the key object weakly, so
//! the map never keeps an object alive. A lookup verifies the stored weak
//! reference is still alive before trusting the address: a dead entry whose
//! address was reused by a new allocation is treated as missing.

use rustc_hash::FxHashMap;

use crate::gc::{GcRef, WeakRef};
use crate::object::JsObject;

const INITIAL_PRUNE_THRESHOLD: usize = 64;

/// Map from object identity to `V`, holding keys weakly
pub struct WeakIdentityMap<V> {
    entries: FxHashMap<usize, (WeakRef<JsObject>, V)>,
    prune_at: usize,
}

impl<V> Default for WeakIdentityMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> WeakIdentityMap<V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            prune_at: INITIAL_PRUNE_THRESHOLD,
        }
    }

    /// Value for a live key
    pub fn get(&self, key: &GcRef<JsObject>) -> Option<&V> {
        match self.entries.get(&key.addr()) {
            Some((weak, value)) if !weak.is_dead() => Some(value),
            _ => None,
        }
    }

    /// Insert or replace. Dead entries are pruned whenever the map doubles.
    pub fn insert(&mut self, key: &GcRef<JsObject>, value: V) {
        if self.entries.len() >= self.prune_at {
            self.prune();
            self.prune_at = (self.entries.len() * 2).max(INITIAL_PRUNE_THRESHOLD);
        }
        self.entries.insert(key.addr(), (key.downgrade(), value));
    }

    pub fn remove(&mut self, key: &GcRef<JsObject>) -> Option<V> {
        self.entries.remove(&key.addr()).map(|(_, value)| value)
    }

    /// Number of entries, including dead ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose key has been reclaimed
    pub fn prune(&mut self) {
        self.entries.retain(|_, (weak, _)| !weak.is_dead());
    }
}
