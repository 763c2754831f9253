//! Bounded least-recently-used record cache.
//!
//! Entries live in a slab of nodes linked into a doubly-linked list by slot
//! index; the map resolves a key to its slot. Promotion, insertion and
//! eviction are all O(1). The list head is the most recently used entry and
//! the tail is the next eviction victim.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// A capacity of zero disables caching: every `put` is dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
        }
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

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let slot = *self.map.get(key)?;
        self.detach(slot);
        self.attach_front(slot);
        self.node(slot).map(|node| node.value.clone())
    }

    /// Insert or overwrite `key`. When a new key arrives at capacity the least
    /// recently used entry is evicted first and returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&slot) = self.map.get(&key) {
            if let Some(node) = self.slots[slot].as_mut() {
                node.value = value;
            }
            self.detach(slot);
            self.attach_front(slot);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, slot);
        self.attach_front(slot);
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.map.remove(key)?;
        self.detach(slot);
        self.free.push(slot);
        self.slots[slot].take().map(|node| node.value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(node) = self.node(cursor) {
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn pop_lru(&mut self) -> Option<(K, V)> {
        if self.tail == NIL {
            return None;
        }
        let slot = self.tail;
        self.detach(slot);
        self.free.push(slot);
        let node = self.slots[slot].take()?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    fn node(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn links(&self, slot: usize) -> (usize, usize) {
        self.node(slot).map_or((NIL, NIL), |n| (n.prev, n.next))
    }

    fn set_prev(&mut self, slot: usize, prev: usize) {
        if let Some(Some(node)) = self.slots.get_mut(slot) {
            node.prev = prev;
        }
    }

    fn set_next(&mut self, slot: usize, next: usize) {
        if let Some(Some(node)) = self.slots.get_mut(slot) {
            node.next = next;
        }
    }

    /// Unlink `slot` from the recency list, leaving its own links cleared.
    fn detach(&mut self, slot: usize) {
        let (prev, next) = self.links(slot);

        if prev == NIL {
            self.head = next;
        } else {
            self.set_next(prev, next);
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.set_prev(next, prev);
        }

        self.set_prev(slot, NIL);
        self.set_next(slot, NIL);
    }

    fn attach_front(&mut self, slot: usize) {
        let old_head = self.head;
        self.set_next(slot, old_head);
        self.set_prev(slot, NIL);
        if old_head == NIL {
            self.tail = slot;
        } else {
            self.set_prev(old_head, slot);
        }
        self.head = slot;
    }
}
