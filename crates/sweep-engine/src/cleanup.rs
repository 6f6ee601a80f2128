use crate::rules::first_match;
use crate::{EngineError, RemoteConnector, UserLocks};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sweep_config::SyncConfig;
use sweep_core::RuleAction;
use sweep_gmail::{labels, EmailError, MailRemote};
use sweep_storage::MailStore;

/// Retry budget for confirming that an archived message left the inbox.
#[derive(Debug, Clone)]
pub struct ArchivePolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl ArchivePolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            retries: config.archive_verify_retries,
            backoff: config.archive_verify_backoff(),
        }
    }
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub dry_run: bool,
    /// Restricts the run to these ids when present.
    #[serde(default)]
    pub only_ids: Option<Vec<String>>,
    /// DELETE removes permanently instead of moving to trash.
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    NoRules,
    NoMatches,
    NoneSelected,
    Preview,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedMessage {
    pub id: String,
    pub action: RuleAction,
    pub sender: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub id: String,
    pub action: RuleAction,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub status: CleanupStatus,
    pub message: String,
    pub affected: Vec<AffectedMessage>,
    /// Ids mutated remotely and dropped from the cache.
    pub processed_ids: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupOutcome {
    fn empty(status: CleanupStatus, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            affected: Vec::new(),
            processed_ids: Vec::new(),
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashOutcome {
    Trashed { had_inbox: bool },
    /// The remote no longer knew the message; the cached copy was dropped.
    AlreadyGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePlacement {
    Inbox,
    Archived,
}

/// Applies a user's rules to the cached mailbox.
#[derive(Clone)]
pub struct CleanupExecutor {
    store: Arc<dyn MailStore>,
    connector: Arc<dyn RemoteConnector>,
    locks: UserLocks,
    archive: ArchivePolicy,
}

impl CleanupExecutor {
    pub fn new(
        store: Arc<dyn MailStore>,
        connector: Arc<dyn RemoteConnector>,
        locks: UserLocks,
        archive: ArchivePolicy,
    ) -> Self {
        Self {
            store,
            connector,
            locks,
            archive,
        }
    }

    pub async fn run(
        &self,
        user_id: &str,
        request: &CleanupRequest,
    ) -> Result<CleanupOutcome, EngineError> {
        let _guard = self.locks.acquire(user_id).await;

        let rules = self.store.list_rules(user_id).await?;
        if rules.is_empty() {
            let message = if request.dry_run {
                "No rules to preview"
            } else {
                "No rules to apply"
            };
            return Ok(CleanupOutcome::empty(CleanupStatus::NoRules, message));
        }

        let messages = self.store.list_all_messages(user_id).await?;
        let now = Utc::now();
        let mut affected = messages
            .iter()
            .filter_map(|message| {
                first_match(message, &rules, now).map(|rule| AffectedMessage {
                    id: message.id.clone(),
                    action: rule.action,
                    sender: message.sender.clone(),
                    subject: message.subject.clone(),
                })
            })
            .collect::<Vec<_>>();

        if affected.is_empty() {
            return Ok(CleanupOutcome::empty(
                CleanupStatus::NoMatches,
                "No messages match the current rules",
            ));
        }

        if let Some(only_ids) = &request.only_ids {
            let allowed: HashSet<&str> = only_ids.iter().map(String::as_str).collect();
            affected.retain(|entry| allowed.contains(entry.id.as_str()));
            if affected.is_empty() {
                return Ok(CleanupOutcome::empty(
                    CleanupStatus::NoneSelected,
                    "None of the selected messages match the current rules",
                ));
            }
        }

        if request.dry_run {
            tracing::info!(user = user_id, count = affected.len(), "cleanup preview");
            return Ok(CleanupOutcome {
                status: CleanupStatus::Preview,
                message: format!("{} messages would be affected", affected.len()),
                affected,
                processed_ids: Vec::new(),
                failures: Vec::new(),
            });
        }

        let remote = self.connector.connect(user_id).await?;
        let mut processed_ids = Vec::new();
        let mut failures = Vec::new();

        for entry in &affected {
            if let Err(err) = self.apply(remote.as_ref(), entry, request.permanent).await {
                tracing::warn!(
                    user = user_id,
                    id = %entry.id,
                    action = %entry.action,
                    error = %err,
                    "cleanup action failed"
                );
                failures.push(CleanupFailure {
                    id: entry.id.clone(),
                    action: entry.action,
                    error: err.to_string(),
                });
                continue;
            }

            processed_ids.push(entry.id.clone());
            if let Err(err) = self.store.delete_message(user_id, &entry.id).await {
                self.record_history(user_id, &processed_ids).await;
                return Err(err.into());
            }
        }

        self.record_history(user_id, &processed_ids).await;
        tracing::info!(
            user = user_id,
            processed = processed_ids.len(),
            failed = failures.len(),
            "cleanup complete"
        );

        Ok(CleanupOutcome {
            status: CleanupStatus::Completed,
            message: format!(
                "Processed {} of {} matching messages",
                processed_ids.len(),
                affected.len()
            ),
            affected,
            processed_ids,
            failures,
        })
    }

    /// Moves one message to trash, remembering whether it was in the inbox.
    pub async fn trash_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<TrashOutcome, EngineError> {
        let _guard = self.locks.acquire(user_id).await;
        let remote = self.connector.connect(user_id).await?;

        let had_inbox = match remote.has_label(message_id, labels::INBOX).await {
            Ok(had_inbox) => had_inbox,
            Err(err) if err.is_not_found() => {
                self.store.delete_message(user_id, message_id).await?;
                return Ok(TrashOutcome::AlreadyGone);
            }
            Err(err) => return Err(err.into()),
        };

        self.store
            .save_trash_origin(user_id, message_id, had_inbox)
            .await?;
        match remote.trash(message_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                self.store.delete_trash_origin(user_id, message_id).await?;
                self.store.delete_message(user_id, message_id).await?;
                return Ok(TrashOutcome::AlreadyGone);
            }
            Err(err) => {
                self.store.delete_trash_origin(user_id, message_id).await?;
                return Err(err.into());
            }
        }

        self.store.delete_message(user_id, message_id).await?;
        tracing::info!(user = user_id, id = message_id, had_inbox, "message trashed");
        Ok(TrashOutcome::Trashed { had_inbox })
    }

    /// Takes a message out of trash and puts it back where it was. Without a
    /// recorded origin it goes back to the inbox.
    pub async fn restore_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<RestorePlacement, EngineError> {
        let _guard = self.locks.acquire(user_id).await;
        let remote = self.connector.connect(user_id).await?;

        remote.untrash(message_id).await?;
        let origin = self.store.get_trash_origin(user_id, message_id).await?;
        let had_inbox = origin.map(|origin| origin.had_inbox).unwrap_or(true);

        let placement = if had_inbox {
            remote.unarchive(message_id).await?;
            RestorePlacement::Inbox
        } else {
            remote.archive(message_id).await?;
            RestorePlacement::Archived
        };
        self.store.delete_trash_origin(user_id, message_id).await?;
        tracing::info!(user = user_id, id = message_id, ?placement, "message restored");

        Ok(placement)
    }

    async fn apply(
        &self,
        remote: &dyn MailRemote,
        entry: &AffectedMessage,
        permanent: bool,
    ) -> Result<(), EmailError> {
        let result = match entry.action {
            RuleAction::Delete if permanent => remote.delete_permanently(&entry.id).await,
            RuleAction::Delete => remote.trash(&entry.id).await,
            RuleAction::Archive => archive_and_verify(remote, &entry.id, &self.archive).await,
            RuleAction::MarkRead => remote.mark_read(&entry.id).await,
        };

        match result {
            Err(err) if entry.action == RuleAction::Delete && err.is_not_found() => {
                tracing::debug!(id = %entry.id, "message already gone remotely");
                Ok(())
            }
            other => other,
        }
    }

    async fn record_history(&self, user_id: &str, processed_ids: &[String]) {
        if processed_ids.is_empty() {
            return;
        }
        if let Err(err) = self
            .store
            .append_cleaning_history(user_id, processed_ids)
            .await
        {
            tracing::error!(user = user_id, error = %err, "failed to record cleaning history");
        }
    }
}

/// Archives `id` and re-checks the inbox label, re-issuing the archive on
/// each retry. Every issued archive is followed by a check. Gives up quietly
/// once the retries are spent.
pub async fn archive_and_verify(
    remote: &dyn MailRemote,
    id: &str,
    policy: &ArchivePolicy,
) -> Result<(), EmailError> {
    remote.archive(id).await?;

    for attempt in 0..=policy.retries {
        match remote.has_label(id, labels::INBOX).await {
            Ok(false) => return Ok(()),
            Ok(true) => {}
            Err(err) => {
                tracing::debug!(id, attempt, error = %err, "archive check failed");
            }
        }
        if attempt == policy.retries {
            break;
        }

        tokio::time::sleep(policy.backoff).await;
        if let Err(err) = remote.archive(id).await {
            tracing::debug!(id, attempt, error = %err, "archive retry failed");
        }
    }

    tracing::warn!(id, retries = policy.retries, "message may still carry the inbox label");
    Ok(())
}
