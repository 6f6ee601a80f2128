use crate::StorageError;
use async_trait::async_trait;
use sweep_core::{
    CachedMessage, CleaningHistoryRecord, MessagePage, MessageQuery, NewRule, Rule, RuleUpdate,
    SenderCount, SettingsUpdate, TrashOrigin, UserSettings,
};
use uuid::Uuid;

/// Durable local cache of one or more users' mailboxes plus their rules,
/// automation settings and audit trail.
#[async_trait]
pub trait MailStore: Send + Sync {
    // -- rules ---------------------------------------------------------------

    /// Rules in evaluation order.
    async fn list_rules(&self, user_id: &str) -> Result<Vec<Rule>, StorageError>;
    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, StorageError>;
    async fn update_rule(
        &self,
        user_id: &str,
        rule_id: Uuid,
        update: &RuleUpdate,
    ) -> Result<Rule, StorageError>;
    async fn delete_rule(&self, user_id: &str, rule_id: Uuid) -> Result<(), StorageError>;

    // -- messages ------------------------------------------------------------

    async fn list_messages(
        &self,
        user_id: &str,
        query: &MessageQuery,
    ) -> Result<MessagePage, StorageError>;
    async fn list_all_messages(&self, user_id: &str) -> Result<Vec<CachedMessage>, StorageError>;
    /// Inserts or replaces every message in one transaction.
    async fn upsert_messages(&self, messages: &[CachedMessage]) -> Result<(), StorageError>;
    /// Returns whether a row was removed.
    async fn delete_message(&self, user_id: &str, message_id: &str)
        -> Result<bool, StorageError>;
    async fn count_messages(&self, user_id: &str) -> Result<u64, StorageError>;
    async fn top_senders(&self, user_id: &str, limit: u32)
        -> Result<Vec<SenderCount>, StorageError>;

    // -- cleaning history ----------------------------------------------------

    async fn append_cleaning_history(
        &self,
        user_id: &str,
        affected_ids: &[String],
    ) -> Result<CleaningHistoryRecord, StorageError>;
    async fn list_cleaning_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<CleaningHistoryRecord>, StorageError>;

    // -- settings ------------------------------------------------------------

    /// Stored settings, or defaults when the user has none yet.
    async fn get_settings(&self, user_id: &str) -> Result<UserSettings, StorageError>;
    async fn upsert_settings(&self, settings: &UserSettings) -> Result<(), StorageError>;
    async fn update_settings(
        &self,
        user_id: &str,
        update: &SettingsUpdate,
    ) -> Result<UserSettings, StorageError>;
    async fn update_history_cursor(&self, user_id: &str, cursor: u64)
        -> Result<(), StorageError>;
    async fn list_automated_users(&self) -> Result<Vec<UserSettings>, StorageError>;
    /// Records `slot` as the user's last fired automation slot. Returns
    /// `false` when that slot was already recorded.
    async fn claim_automation_slot(&self, user_id: &str, slot: &str)
        -> Result<bool, StorageError>;

    // -- trash origins -------------------------------------------------------

    async fn save_trash_origin(
        &self,
        user_id: &str,
        message_id: &str,
        had_inbox: bool,
    ) -> Result<(), StorageError>;
    async fn get_trash_origin(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<TrashOrigin>, StorageError>;
    async fn delete_trash_origin(&self, user_id: &str, message_id: &str)
        -> Result<(), StorageError>;

    // -- maintenance ---------------------------------------------------------

    /// Drops every row in every table. Development use only.
    async fn reset_all(&self) -> Result<(), StorageError>;
}
