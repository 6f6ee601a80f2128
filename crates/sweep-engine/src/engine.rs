use crate::stats::mailbox_stats;
use crate::unsubscribe::unsubscribe;
use crate::{
    ArchivePolicy, AutomationScheduler, CleanupExecutor, EngineError, ProgressTracker,
    RemoteConnector, SyncCoordinator, SyncSettings, UnsubscribeOutcome, UserLocks,
};
use std::sync::Arc;
use sweep_config::AppConfig;
use sweep_core::{MailboxStats, SyncProgress};
use sweep_storage::MailStore;

/// The sync, cleanup and scheduling services wired over one store, sharing
/// per-user locks and progress.
#[derive(Clone)]
pub struct SweepEngine {
    store: Arc<dyn MailStore>,
    connector: Arc<dyn RemoteConnector>,
    sync: SyncCoordinator,
    cleanup: CleanupExecutor,
    scheduler: AutomationScheduler,
}

impl SweepEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn MailStore>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Result<Self, EngineError> {
        let timezone = config
            .scheduler
            .reference_timezone()
            .map_err(|err| EngineError::InvalidSchedule(err.to_string()))?;

        let locks = UserLocks::new();
        let progress = ProgressTracker::new();

        let sync = SyncCoordinator::new(
            store.clone(),
            connector.clone(),
            progress,
            locks.clone(),
            SyncSettings::from_config(&config.sync),
        );
        let cleanup = CleanupExecutor::new(
            store.clone(),
            connector.clone(),
            locks,
            ArchivePolicy::from_config(&config.sync),
        );
        let scheduler = AutomationScheduler::new(
            store.clone(),
            sync.clone(),
            cleanup.clone(),
            timezone,
            config.scheduler.tick(),
        );

        Ok(Self {
            store,
            connector,
            sync,
            cleanup,
            scheduler,
        })
    }

    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn cleanup(&self) -> &CleanupExecutor {
        &self.cleanup
    }

    pub fn scheduler(&self) -> &AutomationScheduler {
        &self.scheduler
    }

    pub fn progress(&self, user_id: &str) -> Option<SyncProgress> {
        self.sync.progress(user_id)
    }

    pub async fn stats(&self, user_id: &str) -> Result<MailboxStats, EngineError> {
        let remote = self.connector.connect(user_id).await?;
        Ok(mailbox_stats(self.store.as_ref(), remote.as_ref(), user_id).await)
    }

    /// Acts on a message's `List-Unsubscribe` header for `user_id`.
    pub async fn unsubscribe(
        &self,
        user_id: &str,
        header: &str,
    ) -> Result<UnsubscribeOutcome, EngineError> {
        let remote = self.connector.connect(user_id).await?;
        unsubscribe(remote.as_ref(), user_id, header).await
    }
}
