//! Bounded record of message ids already handled in this process
//!
//! Oldest ids are evicted first once the capacity is reached. Nothing here is
//! persisted; a restart starts with an empty guard.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

pub struct DedupeGuard {
    capacity: usize,
    inner: Mutex<Seen>,
}

#[derive(Default)]
struct Seen {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl DedupeGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Seen::default()),
        }
    }

    /// Record `id`; returns false if it was already recorded
    pub fn check_and_mark(&self, id: &str) -> bool {
        let mut seen = self.inner.lock();
        if seen.ids.contains(id) {
            return false;
        }
        if seen.order.len() >= self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.ids.remove(&oldest);
            }
        }
        seen.order.push_back(id.to_string());
        seen.ids.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
