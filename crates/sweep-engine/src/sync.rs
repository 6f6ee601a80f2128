use crate::mapping::{to_cached_batch, DateFallback};
use crate::{EngineError, ProgressHandle, ProgressTracker, RemoteConnector, UserLocks};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sweep_config::SyncConfig;
use sweep_core::{SyncKind, SyncProgress};
use sweep_gmail::{labels, EmailError, MailRemote, RemoteMessage};
use sweep_storage::MailStore;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub timeout: Duration,
    pub fallback_window_days: u32,
    pub fallback_max_results: u32,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            timeout: config.timeout(),
            fallback_window_days: config.fallback_window_days,
            fallback_max_results: config.fallback_max_results,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            fallback_window_days: 7,
            fallback_max_results: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub kind: SyncKind,
    pub upserted: usize,
    pub removed: usize,
    /// Cursor stored after the run; 0 when none could be determined.
    pub cursor: u64,
    /// Set when an incremental run had to reseed from recent messages.
    pub fell_back: bool,
}

/// Reconciles the local cache with the remote mailbox.
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn MailStore>,
    connector: Arc<dyn RemoteConnector>,
    progress: ProgressTracker,
    locks: UserLocks,
    settings: SyncSettings,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn MailStore>,
        connector: Arc<dyn RemoteConnector>,
        progress: ProgressTracker,
        locks: UserLocks,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            connector,
            progress,
            locks,
            settings,
        }
    }

    pub fn progress(&self, user_id: &str) -> Option<SyncProgress> {
        self.progress.get(user_id)
    }

    /// Re-lists the whole inbox and upserts every message with a parsable date.
    pub async fn full_sync(&self, user_id: &str) -> Result<SyncReport, EngineError> {
        let _guard = self.locks.acquire(user_id).await;
        self.bounded(user_id, self.run_full(user_id)).await
    }

    /// Applies history changes since the stored cursor, reseeding from
    /// recent messages when the cursor is missing or stale.
    pub async fn incremental_sync(&self, user_id: &str) -> Result<SyncReport, EngineError> {
        let _guard = self.locks.acquire(user_id).await;
        self.bounded(user_id, self.run_incremental(user_id)).await
    }

    async fn bounded<F>(&self, user_id: &str, run: F) -> Result<SyncReport, EngineError>
    where
        F: Future<Output = Result<SyncReport, EngineError>>,
    {
        match tokio::time::timeout(self.settings.timeout, run).await {
            Ok(result) => {
                if let Err(err) = &result {
                    tracing::error!(user = user_id, error = %err, "sync failed");
                }
                result
            }
            Err(_) => {
                tracing::error!(
                    user = user_id,
                    timeout_secs = self.settings.timeout.as_secs(),
                    "sync timed out, batch discarded"
                );
                Err(EngineError::Timeout {
                    user: user_id.to_string(),
                    secs: self.settings.timeout.as_secs(),
                })
            }
        }
    }

    async fn run_full(&self, user_id: &str) -> Result<SyncReport, EngineError> {
        let progress = self.progress.start(user_id, SyncKind::Full);
        let remote = self.connector.connect(user_id).await?;
        let profile_cursor = profile_cursor(remote.as_ref(), user_id).await;

        progress.update("Listing messages", 0, 0);
        let ids = remote.list_all_ids("", &[labels::INBOX]).await?;
        tracing::info!(user = user_id, count = ids.len(), "full sync listed inbox");

        let details = fetch_details(remote.as_ref(), &ids, &progress).await?;
        let messages = to_cached_batch(&details, user_id, DateFallback::Skip);

        progress.update("Saving", 0, messages.len() as u64);
        self.store.upsert_messages(&messages).await?;

        let cursor = seed_cursor(profile_cursor, &details);
        if cursor > 0 {
            self.store.update_history_cursor(user_id, cursor).await?;
        }
        tracing::info!(user = user_id, upserted = messages.len(), cursor, "full sync complete");

        Ok(SyncReport {
            kind: SyncKind::Full,
            upserted: messages.len(),
            removed: 0,
            cursor,
            fell_back: false,
        })
    }

    async fn run_incremental(&self, user_id: &str) -> Result<SyncReport, EngineError> {
        let progress = self.progress.start(user_id, SyncKind::Quick);
        let settings = self.store.get_settings(user_id).await?;
        let remote = self.connector.connect(user_id).await?;

        if settings.history_cursor == 0 {
            tracing::info!(user = user_id, "no history cursor, reseeding from recent mail");
            return self.reseed(user_id, remote.as_ref(), &progress).await;
        }

        progress.update("Checking history", 0, 0);
        let delta = match remote.history_delta(settings.history_cursor).await {
            Ok(delta) => delta,
            Err(EmailError::StaleCursor(cursor)) => {
                tracing::warn!(user = user_id, cursor, "history cursor rejected, reseeding");
                return self.reseed(user_id, remote.as_ref(), &progress).await;
            }
            Err(err) => return Err(err.into()),
        };

        let mut seen = HashSet::new();
        let added: Vec<String> = delta
            .added_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        tracing::info!(
            user = user_id,
            added = added.len(),
            removed = delta.removed_ids.len(),
            "history delta received"
        );

        let details = fetch_details(remote.as_ref(), &added, &progress).await?;
        let messages = to_cached_batch(&details, user_id, DateFallback::InternalDate);

        progress.update("Saving", 0, (messages.len() + delta.removed_ids.len()) as u64);
        self.store.upsert_messages(&messages).await?;
        let mut removed_count = 0;
        for id in &delta.removed_ids {
            if self.store.delete_message(user_id, id).await? {
                removed_count += 1;
            }
        }

        let cursor = if delta.new_cursor > 0 {
            delta.new_cursor
        } else {
            settings.history_cursor
        };
        self.store.update_history_cursor(user_id, cursor).await?;
        tracing::info!(
            user = user_id,
            from = settings.history_cursor,
            to = cursor,
            "history cursor advanced"
        );

        Ok(SyncReport {
            kind: SyncKind::Quick,
            upserted: messages.len(),
            removed: removed_count,
            cursor,
            fell_back: false,
        })
    }

    /// Bounded full sync of recent inbox mail whose real purpose is to
    /// obtain a fresh cursor.
    async fn reseed(
        &self,
        user_id: &str,
        remote: &dyn MailRemote,
        progress: &ProgressHandle,
    ) -> Result<SyncReport, EngineError> {
        let profile_cursor = profile_cursor(remote, user_id).await;

        progress.update("Fetching recent emails", 0, 0);
        let query = format!("newer_than:{}d", self.settings.fallback_window_days);
        let ids = remote
            .list_ids(&query, &[labels::INBOX], self.settings.fallback_max_results)
            .await?;

        let details = fetch_details(remote, &ids, progress).await?;
        let messages = to_cached_batch(&details, user_id, DateFallback::InternalDate);

        progress.update("Saving", 0, messages.len() as u64);
        self.store.upsert_messages(&messages).await?;

        let mut cursor = seed_cursor(profile_cursor, &details);
        if cursor == 0 {
            cursor = newest_inbox_cursor(remote).await?;
        }
        if cursor == 0 {
            return Err(EngineError::CursorUnavailable(user_id.to_string()));
        }
        self.store.update_history_cursor(user_id, cursor).await?;
        tracing::info!(user = user_id, upserted = messages.len(), cursor, "cursor reseeded");

        Ok(SyncReport {
            kind: SyncKind::Quick,
            upserted: messages.len(),
            removed: 0,
            cursor,
            fell_back: true,
        })
    }
}

async fn fetch_details(
    remote: &dyn MailRemote,
    ids: &[String],
    progress: &ProgressHandle,
) -> Result<Vec<RemoteMessage>, EngineError> {
    let total = ids.len() as u64;
    progress.update("Fetching details", 0, total);
    let details = remote.get_details(ids).await?;
    progress.update("Fetching details", total, total);
    Ok(details)
}

async fn profile_cursor(remote: &dyn MailRemote, user_id: &str) -> u64 {
    match remote.current_cursor().await {
        Ok(cursor) => cursor,
        Err(err) => {
            tracing::warn!(user = user_id, error = %err, "could not read profile history id");
            0
        }
    }
}

/// Cursor to store after listing: the profile value captured before the
/// listing, else the newest history id among the fetched messages.
fn seed_cursor(profile_cursor: u64, details: &[RemoteMessage]) -> u64 {
    if profile_cursor > 0 {
        return profile_cursor;
    }
    details
        .iter()
        .map(|message| message.history_id)
        .max()
        .unwrap_or(0)
}

async fn newest_inbox_cursor(remote: &dyn MailRemote) -> Result<u64, EngineError> {
    let ids = remote.list_ids("", &[labels::INBOX], 1).await?;
    if ids.is_empty() {
        return Ok(0);
    }
    let details = remote.get_details(&ids).await?;
    Ok(seed_cursor(0, &details))
}
