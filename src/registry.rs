// ===============================
// src/registry.rs (tracked traders)
// ===============================

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::info;

use crate::domain::{RegistryChange, TraderRecord};
use crate::metrics::{self, TRADERS_TRACKED};
use crate::store::SnapshotStore;

/// Set of traders the scheduler polls. Mutations land between cycles: the
/// scheduler reads `list()` once at the start of each cycle.
pub struct TraderRegistry {
    traders: Mutex<Vec<TraderRecord>>,
    store: Arc<SnapshotStore>,
    changes: broadcast::Sender<RegistryChange>,
}

impl TraderRegistry {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self { traders: Mutex::new(Vec::new()), store, changes }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraderRecord>> {
        self.traders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stream of add/remove/rename, for persistence and mirroring.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    /// Returns false (and changes nothing) if the code is already tracked.
    pub fn add(&self, code: &str, display_name: Option<&str>) -> bool {
        let record = TraderRecord::new(code, display_name);
        {
            let mut traders = self.lock();
            if traders.iter().any(|t| t.code == record.code) {
                return false;
            }
            traders.push(record.clone());
            TRADERS_TRACKED.set(traders.len() as i64);
        }
        self.store.track(&record.code);
        info!(trader = %record.code, name = %record.display_name, "trader added");
        let _ = self.changes.send(RegistryChange::Added(record));
        true
    }

    pub fn remove(&self, code: &str) -> Option<TraderRecord> {
        let removed = {
            let mut traders = self.lock();
            let idx = traders.iter().position(|t| t.code == code)?;
            let rec = traders.remove(idx);
            TRADERS_TRACKED.set(traders.len() as i64);
            rec
        };
        self.store.forget(code);
        metrics::forget_trader(code);
        info!(trader = %removed.code, name = %removed.display_name, "trader removed");
        let _ = self.changes.send(RegistryChange::Removed(removed.code.clone()));
        Some(removed)
    }

    /// Empty name resets to the default `Trader-XXXXXXXX`.
    pub fn rename(&self, code: &str, display_name: &str) -> bool {
        let renamed = {
            let mut traders = self.lock();
            let Some(t) = traders.iter_mut().find(|t| t.code == code) else { return false };
            *t = TraderRecord::new(code, Some(display_name));
            t.clone()
        };
        info!(trader = %renamed.code, name = %renamed.display_name, "trader renamed");
        let _ = self.changes.send(RegistryChange::Renamed(renamed));
        true
    }

    pub fn get(&self, code: &str) -> Option<TraderRecord> {
        self.lock().iter().find(|t| t.code == code).cloned()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.lock().iter().any(|t| t.code == code)
    }

    /// Copy in insertion order; no lock is held by the caller afterwards.
    pub fn list(&self) -> Vec<TraderRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}
