//! Bounded memory of recently processed command ids
//!
//! Duplicate detection only needs to cover the short redelivery window of the
//! backend, so ids live in a fixed ring with FIFO eviction. An id that has been
//! pushed out by `capacity` newer ids can be processed again.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of command ids
#[derive(Debug, Clone)]
pub struct RecencyRing {
    ids: VecDeque<String>,
    capacity: usize,
}

impl RecencyRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        let id = id.trim();
        self.ids.iter().any(|seen| seen == id)
    }

    /// Remember `id`, evicting the oldest entry when full
    ///
    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.contains(id) {
            return false;
        }
        if self.ids.len() == self.capacity {
            self.ids.pop_front();
        }
        self.ids.push_back(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
