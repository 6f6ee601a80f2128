use crate::{CleanupExecutor, CleanupRequest, EngineError, SyncCoordinator};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use sweep_core::{AutomationFrequency, UserSettings};
use sweep_storage::MailStore;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Counts for one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub due: usize,
    pub fired: usize,
    pub failed: usize,
    /// Due users whose slot had already been claimed.
    pub skipped: usize,
}

/// Slot key for `settings` if automation is due at `now`, `None` otherwise.
///
/// Weekly schedules only compare hour and minute, so they come due on every
/// day the clock matches. The key carries the ISO week and weekday to keep
/// each of those firings distinct.
pub fn due_slot(settings: &UserSettings, now: &DateTime<Tz>) -> Option<String> {
    if !settings.automation_enabled {
        return None;
    }

    let at = settings.time_of_day;
    let due = match settings.frequency {
        AutomationFrequency::Hourly => now.minute() == at.minute(),
        AutomationFrequency::Daily | AutomationFrequency::Weekly => {
            now.hour() == at.hour() && now.minute() == at.minute()
        }
    };
    if !due {
        return None;
    }

    let bucket = match settings.frequency {
        AutomationFrequency::Hourly | AutomationFrequency::Daily => {
            now.format("%Y-%m-%d-%H:%M").to_string()
        }
        AutomationFrequency::Weekly => now.format("%G-W%V-%a-%H:%M").to_string(),
    };
    Some(format!(
        "{}-{}-{}",
        settings.user_id, settings.frequency, bucket
    ))
}

/// Drives automated cleanup for every user who enabled it.
#[derive(Clone)]
pub struct AutomationScheduler {
    store: Arc<dyn MailStore>,
    sync: SyncCoordinator,
    cleanup: CleanupExecutor,
    timezone: Tz,
    tick: Duration,
}

impl AutomationScheduler {
    pub fn new(
        store: Arc<dyn MailStore>,
        sync: SyncCoordinator,
        cleanup: CleanupExecutor,
        timezone: Tz,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            sync,
            cleanup,
            timezone,
            tick,
        }
    }

    /// One pass over all automated users. A single user's failure is logged
    /// and never stops the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, EngineError> {
        let local_now = now.with_timezone(&self.timezone);
        let users = self.store.list_automated_users().await?;
        let mut summary = TickSummary::default();

        for settings in &users {
            let Some(slot) = due_slot(settings, &local_now) else {
                continue;
            };
            summary.due += 1;
            let user_id = settings.user_id.as_str();

            match self.store.claim_automation_slot(user_id, &slot).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(user = user_id, slot = %slot, "slot already fired");
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::error!(user = user_id, error = %err, "failed to claim automation slot");
                    summary.failed += 1;
                    continue;
                }
            }

            tracing::info!(user = user_id, slot = %slot, "running scheduled cleanup");
            if let Err(err) = self.sync.incremental_sync(user_id).await {
                tracing::warn!(
                    user = user_id,
                    error = %err,
                    "pre-cleanup sync failed, using cached mail"
                );
            }

            let request = CleanupRequest::default();
            match self.cleanup.run(user_id, &request).await {
                Ok(outcome) => {
                    summary.fired += 1;
                    tracing::info!(
                        user = user_id,
                        status = ?outcome.status,
                        processed = outcome.processed_ids.len(),
                        failed = outcome.failures.len(),
                        "scheduled cleanup finished"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::error!(user = user_id, error = %err, "scheduled cleanup failed");
                }
            }
        }

        Ok(summary)
    }

    /// Ticks until `shutdown` flips to true or its sender goes away. A pass
    /// that has started always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            tick_secs = self.tick.as_secs(),
            timezone = %self.timezone,
            "automation scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            match self.tick(Utc::now()).await {
                Ok(summary) if summary.due > 0 => {
                    tracing::info!(
                        due = summary.due,
                        fired = summary.fired,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        "scheduler tick"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "scheduler tick failed"),
            }
        }

        tracing::info!("automation scheduler stopped");
    }
}
