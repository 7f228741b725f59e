use std::collections::HashSet;
use std::sync::Mutex;

/// Concurrency-safe set of store identifiers seen during one run
///
/// Entries are inserted exactly once and never removed. `insert` is the only
/// gate between feed discovery and store-detail fetches, so the check and the
/// insertion happen under one lock.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: Mutex<HashSet<String>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id`, returning `true` only for the first caller to present it
    pub fn insert(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
