//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same key share one computation: the
//! first caller runs it, everybody else blocks until its result is ready.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};

/// Map of keys to a shared, computed-at-most-once result.
pub struct InFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceLock<V>>>>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        InFlight {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the result for `key`, computing it with `f` if nobody has.
    ///
    /// Returns the value and whether this call was the one that computed it.
    pub fn run(&self, key: &K, f: impl FnOnce() -> V) -> (V, bool) {
        let slot = {
            let mut slots = self.slots.lock().expect("in-flight lock poisoned");
            slots.entry(key.clone()).or_default().clone()
        };

        let mut computed = false;
        let value = slot.get_or_init(|| {
            computed = true;
            f()
        });
        (value.clone(), computed)
    }

    /// A result that is already available.
    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().expect("in-flight lock poisoned");
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("in-flight lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
