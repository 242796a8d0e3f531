//! Least-recently-used eviction strategy
//!
//! Entries live in a slab of nodes addressed by index. The nodes form a
//! doubly linked list ordered most-recently-used (head) to
//! least-recently-used (tail); a hash map gives O(1) key → slot lookup.
//! Freed slots are recycled through a free list.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Pushed out by capacity pressure
    Capacity,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Capacity => f.write_str("capacity"),
        }
    }
}

/// Passed to the eviction callback before the entry is dropped
#[derive(Debug)]
pub struct EvictionEvent<'a, K, V> {
    pub key: &'a K,
    pub value: &'a V,
    pub reason: EvictionReason,
}

/// Eviction callback; must not touch the cache that invoked it
pub type EvictionCallback<K, V> = Box<dyn FnMut(&EvictionEvent<'_, K, V>) + Send>;

/// Hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LruStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl LruStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity map with LRU eviction
pub struct LruStrategy<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hits: u64,
    misses: u64,
    evictions: u64,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> fmt::Debug for LruStrategy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruStrategy")
            .field("capacity", &self.capacity)
            .field("size", &self.map.len())
            .field("evictions", &self.evictions)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + Eq + Clone, V> LruStrategy<K, V> {
    /// Create an empty cache; capacity must be at least 1
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::invalid("LRU capacity must be at least 1"));
        }
        Ok(Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity.min(1024)),
            free: Vec::new(),
            head: None,
            tail: None,
            hits: 0,
            misses: 0,
            evictions: 0,
            on_evict: None,
        })
    }

    /// Register the callback fired on capacity evictions
    pub fn with_eviction_callback(
        mut self,
        callback: impl FnMut(&EvictionEvent<'_, K, V>) + Send + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(callback));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.move_to_head(idx);
                Some(&self.node(idx).value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Get a value without changing recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|&idx| &self.node(idx).value)
    }

    /// Check membership without changing recency
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or update a value, making it most recently used
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.node_mut(idx).value = value;
            self.move_to_head(idx);
            return None;
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_head(idx);

        if self.map.len() > self.capacity {
            return self.evict_tail();
        }
        None
    }

    /// Remove an entry (no eviction callback)
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.release(idx).map(|node| node.value)
    }

    /// Mark an entry most recently used without reading it
    pub fn touch(&mut self, key: &K) -> bool {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.move_to_head(idx);
                true
            }
            None => false,
        }
    }

    /// Drop every entry without firing eviction callbacks
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Change capacity, evicting from the tail when shrinking
    pub fn resize(&mut self, capacity: usize) -> Result<Vec<(K, V)>, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::invalid("LRU capacity must be at least 1"));
        }
        self.capacity = capacity;
        let mut evicted = Vec::new();
        while self.map.len() > self.capacity {
            match self.evict_tail() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        Ok(evicted)
    }

    /// Least recently used key
    pub fn lru_key(&self) -> Option<&K> {
        self.tail.map(|idx| &self.node(idx).key)
    }

    /// Most recently used key
    pub fn mru_key(&self) -> Option<&K> {
        self.head.map(|idx| &self.node(idx).key)
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            lru: self,
            cursor: self.head,
        }
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (k, v) in self.iter() {
            f(k, v);
        }
    }

    /// Total capacity evictions over the lifetime of this cache
    pub fn eviction_count(&self) -> u64 {
        self.evictions
    }

    pub fn stats(&self) -> LruStats {
        LruStats {
            size: self.map.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn evict_tail(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        if let Some(callback) = self.on_evict.as_mut()
            && let Some(node) = self.slots[idx].as_ref()
        {
            callback(&EvictionEvent {
                key: &node.key,
                value: &node.value,
                reason: EvictionReason::Capacity,
            });
        }
        self.unlink(idx);
        let node = self.release(idx)?;
        self.map.remove(&node.key);
        self.evictions += 1;
        Some((node.key, node.value))
    }

    // Slots referenced from `map`, `head`, `tail` or a link are always occupied
    fn node(&self, idx: usize) -> &Node<K, V> {
        self.slots[idx].as_ref().expect("linked slot is occupied")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().expect("linked slot is occupied")
    }

    fn release(&mut self, idx: usize) -> Option<Node<K, V>> {
        let node = self.slots[idx].take();
        self.free.push(idx);
        node
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_head(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.node_mut(h).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn move_to_head(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_head(idx);
    }
}

/// Iterator over entries from most to least recently used
pub struct Iter<'a, K, V> {
    lru: &'a LruStrategy<K, V>,
    cursor: Option<usize>,
}

impl<'a, K: Hash + Eq + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.lru.node(self.cursor?);
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
