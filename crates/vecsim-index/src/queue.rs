//! Max-heap whose entries can be re-prioritized in place.
//!
//! Each payload appears at most once. Emplacing a payload that is already
//! present overwrites its priority and restores heap order instead of adding a
//! second entry. Ordering is by priority, then by payload, both descending.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// Updatable max-heap of `(priority, payload)` pairs.
#[derive(Debug, Clone)]
pub struct UpdatableMaxHeap<P, V> {
    heap: Vec<(P, V)>,
    positions: HashMap<V, usize>,
}

impl<P, V> Default for UpdatableMaxHeap<P, V> {
    fn default() -> Self {
        Self {
            heap: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<P, V> UpdatableMaxHeap<P, V>
where
    P: Copy + PartialOrd,
    V: Copy + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, payload: V) -> bool {
        self.positions.contains_key(&payload)
    }

    /// Current priority of `payload`, if present.
    pub fn priority_of(&self, payload: V) -> Option<P> {
        self.positions.get(&payload).map(|&pos| self.heap[pos].0)
    }

    /// Insert `payload`, or overwrite its priority if it is already present.
    pub fn emplace(&mut self, priority: P, payload: V) {
        match self.positions.get(&payload) {
            Some(&pos) => {
                self.heap[pos].0 = priority;
                let pos = self.sift_up(pos);
                self.sift_down(pos);
            }
            None => {
                let pos = self.heap.len();
                self.heap.push((priority, payload));
                self.positions.insert(payload, pos);
                self.sift_up(pos);
            }
        }
    }

    /// The maximum entry, without removing it. `None` on an empty heap.
    pub fn peek(&self) -> Option<(P, V)> {
        self.heap.first().copied()
    }

    /// Remove and return the maximum entry.
    pub fn pop(&mut self) -> Option<(P, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap_entries(0, last);
        let top = self.heap.pop()?;
        self.positions.remove(&top.1);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(top)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    /// Consume the heap, returning its entries in no particular order.
    pub fn into_vec(self) -> Vec<(P, V)> {
        self.heap
    }

    fn greater(a: &(P, V), b: &(P, V)) -> bool {
        match a.0.partial_cmp(&b.0) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Less) => false,
            _ => a.1 > b.1,
        }
    }

    fn swap_entries(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.heap.swap(i, j);
        self.positions.insert(self.heap[i].1, i);
        self.positions.insert(self.heap[j].1, j);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !Self::greater(&self.heap[pos], &self.heap[parent]) {
                break;
            }
            self.swap_entries(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut largest = pos;
            if left < len && Self::greater(&self.heap[left], &self.heap[largest]) {
                largest = left;
            }
            if right < len && Self::greater(&self.heap[right], &self.heap[largest]) {
                largest = right;
            }
            if largest == pos {
                break;
            }
            self.swap_entries(pos, largest);
            pos = largest;
        }
    }
}
