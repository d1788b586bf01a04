//! Key-indexed binary heap.
//!
//! A min-heap under a caller supplied "less" comparator with an auxiliary
//! key → position index, so items can be looked up, updated and deleted by
//! key in O(1) + O(log n). Position 0 always holds the minimum.
//!
//! The heap is not synchronized; every queue wraps its heaps in its own lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::SchedulerError;

/// Extracts the unique key of an item.
pub type KeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Strict "a sorts before b" comparator.
pub type LessFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct Entry<T> {
    key: String,
    item: T,
}

/// Binary heap whose items are addressable by key.
pub struct Heap<T> {
    entries: Vec<Entry<T>>,
    index: HashMap<String, usize>,
    key_fn: KeyFn<T>,
    less: LessFn<T>,
}

impl<T> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<T> Heap<T> {
    /// Create an empty heap.
    pub fn new(key_fn: KeyFn<T>, less: LessFn<T>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            key_fn,
            less,
        }
    }

    /// Insert a new item.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateKey`] if an item with the same key is held.
    pub fn add(&mut self, item: T) -> Result<(), SchedulerError> {
        let key = (self.key_fn)(&item);
        if self.index.contains_key(&key) {
            return Err(SchedulerError::DuplicateKey(key));
        }
        let pos = self.entries.len();
        self.index.insert(key.clone(), pos);
        self.entries.push(Entry { key, item });
        self.sift_up(pos);
        Ok(())
    }

    /// Replace the item with the same key and restore order.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] if no item has this key.
    pub fn update(&mut self, item: T) -> Result<(), SchedulerError> {
        let key = (self.key_fn)(&item);
        let pos = *self
            .index
            .get(&key)
            .ok_or_else(|| SchedulerError::NotFound(key.clone()))?;
        self.entries[pos].item = item;
        self.fix(pos);
        Ok(())
    }

    /// Remove the item with the same key as `item`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] if no item has this key.
    pub fn delete(&mut self, item: &T) -> Result<T, SchedulerError> {
        let key = (self.key_fn)(item);
        self.delete_by_key(&key)
    }

    /// Remove the item stored under `key`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotFound`] if no item has this key.
    pub fn delete_by_key(&mut self, key: &str) -> Result<T, SchedulerError> {
        let pos = *self
            .index
            .get(key)
            .ok_or_else(|| SchedulerError::NotFound(key.to_string()))?;
        Ok(self.remove_at(pos))
    }

    /// Remove and return the minimum.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Empty`] when the heap holds nothing.
    pub fn pop(&mut self) -> Result<T, SchedulerError> {
        if self.entries.is_empty() {
            return Err(SchedulerError::Empty);
        }
        Ok(self.remove_at(0))
    }

    /// The minimum, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.entries.first().map(|e| &e.item)
    }

    /// Look up the stored item with the same key as `item`.
    pub fn get(&self, item: &T) -> Option<&T> {
        let key = (self.key_fn)(item);
        self.get_by_key(&key)
    }

    /// Look up an item by key.
    #[must_use]
    pub fn get_by_key(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&pos| &self.entries[pos].item)
    }

    /// Whether an item with this key is held.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Snapshot of all items in heap order; index 0 is the minimum.
    #[must_use]
    pub fn list(&self) -> Vec<&T> {
        self.entries.iter().map(|e| &e.item).collect()
    }

    /// Remove every item, returning them in heap-internal order.
    pub fn drain(&mut self) -> Vec<T> {
        self.index.clear();
        self.entries.drain(..).map(|e| e.item).collect()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_at(&mut self, pos: usize) -> T {
        let removed = self.entries.swap_remove(pos);
        self.index.remove(&removed.key);
        if pos < self.entries.len() {
            self.index.insert(self.entries[pos].key.clone(), pos);
            self.fix(pos);
        }
        removed.item
    }

    fn fix(&mut self, pos: usize) {
        if !self.sift_down(pos) {
            self.sift_up(pos);
        }
    }

    fn less_at(&self, a: usize, b: usize) -> bool {
        (self.less)(&self.entries[a].item, &self.entries[b].item)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.index.insert(self.entries[a].key.clone(), a);
        self.index.insert(self.entries[b].key.clone(), b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less_at(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    /// Returns whether the item moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.entries.len();
        let mut pos = start;
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less_at(right, left) {
                right
            } else {
                left
            };
            if !self.less_at(child, pos) {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
        pos > start
    }
}
