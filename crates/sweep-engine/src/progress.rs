use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use sweep_core::{SyncKind, SyncProgress};

/// Latest sync progress snapshot per user.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    entries: Arc<RwLock<HashMap<String, SyncProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run for `user_id`. The entry lives until the returned
    /// handle is dropped.
    pub fn start(&self, user_id: &str, kind: SyncKind) -> ProgressHandle {
        let handle = ProgressHandle {
            tracker: self.clone(),
            user_id: user_id.to_string(),
            kind,
        };
        handle.update("Starting", 0, 0);
        handle
    }

    pub fn get(&self, user_id: &str) -> Option<SyncProgress> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(user_id).cloned()
    }

    fn set(&self, user_id: &str, progress: SyncProgress) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(user_id.to_string(), progress);
    }

    fn clear(&self, user_id: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(user_id);
    }
}

pub struct ProgressHandle {
    tracker: ProgressTracker,
    user_id: String,
    kind: SyncKind,
}

impl ProgressHandle {
    pub fn update(&self, stage: &str, current: u64, total: u64) {
        self.tracker
            .set(&self.user_id, SyncProgress::new(self.kind, stage, current, total));
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.tracker.clear(&self.user_id);
    }
}
