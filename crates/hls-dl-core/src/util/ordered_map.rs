use std::collections::HashMap;
use std::sync::RwLock;

/// A map that remembers insertion order, for the task manager's "snapshot
/// in insertion order" and "iterate in insertion order" requirements.
///
/// Re-inserting an existing key updates its value in place without moving
/// it in iteration order.
pub struct OrderedMap<V> {
    inner: RwLock<Inner<V>>,
}

struct Inner<V> {
    order: Vec<String>,
    values: HashMap<String, V>,
}

impl<V: Clone> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                order: Vec::new(),
                values: HashMap::new(),
            }),
        }
    }

    /// Inserts `value` under `key`. Returns `true` if `key` already existed
    /// (value replaced in place), `false` if this is a new key (appended).
    pub fn set(&self, key: &str, value: V) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.values.contains_key(key) {
            inner.values.insert(key.to_string(), value);
            true
        } else {
            inner.order.push(key.to_string());
            inner.values.insert(key.to_string(), value);
            false
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.read().unwrap().values.get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.values.remove(key).is_some() {
            inner.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read().unwrap().order.clone()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .map(|k| inner.values[k].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, V)> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .map(|k| (k.clone(), inner.values[k].clone()))
            .collect()
    }
}

impl<V: Clone> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
