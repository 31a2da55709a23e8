//! Two-level index: primary key → secondary id → value
//!
//! Used wherever a one-to-many relation must be queried from the "one"
//! side (type → producers, type → jobs, owner → jobs, owner → subscriptions).
//! Not synchronized itself; owners keep it behind their registry lock.

use std::collections::HashMap;

#[derive(Debug)]
pub struct MultiMap<V> {
    map: HashMap<String, HashMap<String, V>>,
}

impl<V> Default for MultiMap<V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<V: Clone> MultiMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value stored under (`key`, `id`)
    pub fn put(&mut self, key: &str, id: &str, value: V) {
        self.map
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), value);
    }

    /// Remove (`key`, `id`). Drops the inner map once it becomes empty.
    pub fn remove(&mut self, key: &str, id: &str) -> Option<V> {
        let inner = self.map.get_mut(key)?;
        let removed = inner.remove(id);
        if inner.is_empty() {
            self.map.remove(key);
        }
        removed
    }

    /// All values under `key`, in no particular order. Empty if unknown.
    pub fn get(&self, key: &str) -> Vec<V> {
        self.map
            .get(key)
            .map(|inner| inner.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
