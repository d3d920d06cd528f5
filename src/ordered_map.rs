//! A small insertion-ordered map used wherever the planner's determinism
//! depends on visiting libraries in the order they were first observed.

use std::collections::HashMap;

#[derive(Debug, Clone)]
/// A map that remembers the order in which keys were first inserted
pub struct OrderedMap<V> {
    order: Vec<String>,
    values: HashMap<String, V>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }

    /// Insert `value` under `key`, or overwrite it in place if already present.
    /// Overwriting never changes the key's position in iteration order.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value);
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&V> {
        self.values.get(key)
    }

    /// Look up a value by key, mutably
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.values.get_mut(key)
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.order
            .iter()
            .filter_map(move |k| self.values.get(k).map(|v| (k.as_str(), v)))
    }

    /// The keys, in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_across_reinsertion() {
        let mut map = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("b", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(*map.get("b").unwrap(), 3);
    }
}
