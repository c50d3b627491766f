//! Bounded, insertion-ordered set of recently processed action ids.

use std::collections::{HashSet, VecDeque};

/// Remembers the most recent action ids. Once more than `cap` ids are held the
/// set is trimmed to the newest `keep`.
#[derive(Debug, Clone)]
pub struct ProcessedActions {
    order: VecDeque<String>,
    seen: HashSet<String>,
    cap: usize,
    keep: usize,
}

impl ProcessedActions {
    pub fn new(cap: usize, keep: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            cap,
            keep: keep.min(cap),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record an id. Returns false when it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.cap {
            while self.order.len() > self.keep {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProcessedActions {
    fn default() -> Self {
        Self::new(100, 50)
    }
}
