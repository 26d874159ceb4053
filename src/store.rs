// ===============================
// src/store.rs (per-trader snapshot cache)
// ===============================

use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap as HashMap;

use crate::domain::SnapshotSet;

#[derive(Debug, Clone)]
struct Entry {
    last: SnapshotSet,
    first_poll: bool,
}

/// Last snapshot set per trader plus the first-poll marker.
///
/// Each call takes the lock once and releases it before returning, so the
/// store can be shared between the poll loop and the admin side freely.
/// A trader with no entry is "first poll pending".
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl SnapshotStore {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh entry for a newly tracked trader. Overwrites any leftover state.
    pub fn track(&self, code: &str) {
        self.lock().insert(code.to_string(), Entry { last: SnapshotSet::new(), first_poll: true });
    }

    pub fn record_first_seen(&self, code: &str, set: SnapshotSet) {
        self.lock().insert(code.to_string(), Entry { last: set, first_poll: false });
    }

    pub fn get_previous(&self, code: &str) -> SnapshotSet {
        self.lock().get(code).map(|e| e.last.clone()).unwrap_or_default()
    }

    pub fn is_first_poll(&self, code: &str) -> bool {
        self.lock().get(code).map(|e| e.first_poll).unwrap_or(true)
    }

    /// Replace the book of a known trader. A code with no entry (never
    /// tracked, or forgotten meanwhile) is left absent, so it stays first-poll.
    pub fn update(&self, code: &str, set: SnapshotSet) {
        if let Some(entry) = self.lock().get_mut(code) {
            entry.last = set;
        }
    }

    pub fn forget(&self, code: &str) {
        self.lock().remove(code);
    }

    /// Drop every cached book; the given traders start over as first-poll.
    pub fn reset_all<'a>(&self, codes: impl IntoIterator<Item = &'a str>) {
        let mut guard = self.lock();
        guard.clear();
        for code in codes {
            guard.insert(code.to_string(), Entry { last: SnapshotSet::new(), first_poll: true });
        }
    }

    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}
