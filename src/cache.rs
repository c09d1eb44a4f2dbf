//! Least-recently-used cache of decoded trees, keyed by build number.
//!
//! Entries are pure functions of the stored documents, so evicting one only
//! costs a re-decode.

use std::collections::{HashMap, VecDeque};

use crate::tree::CoverageTree;

#[derive(Debug)]
pub struct TreeCache {
    capacity: usize,
    entries: HashMap<u64, CoverageTree>,
    // Front is least recently used.
    order: VecDeque<u64>,
}

impl TreeCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, build: u64) -> bool {
        self.entries.contains_key(&build)
    }

    pub fn get(&mut self, build: u64) -> Option<&CoverageTree> {
        if self.entries.contains_key(&build) {
            self.touch(build);
        }
        self.entries.get(&build)
    }

    pub fn insert(&mut self, build: u64, tree: CoverageTree) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(build, tree).is_some() {
            self.touch(build);
            return;
        }
        self.order.push_back(build);
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop one entry; returns whether it was cached.
    pub fn evict(&mut self, build: u64) -> bool {
        self.order.retain(|&b| b != build);
        self.entries.remove(&build).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, build: u64) {
        self.order.retain(|&b| b != build);
        self.order.push_back(build);
    }
}
