use crate::{EmailError, OutgoingMail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System label ids used by the sync and cleanup paths.
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const UNREAD: &str = "UNREAD";
    pub const TRASH: &str = "TRASH";
    pub const SPAM: &str = "SPAM";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Metadata view of a remote message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub snippet: String,
    pub label_ids: Vec<String>,
    /// 0 when the remote did not report one.
    pub history_id: u64,
    pub internal_date: Option<DateTime<Utc>>,
    pub headers: Vec<MessageHeader>,
}

impl RemoteMessage {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|id| id == label)
    }
}

/// Changes reported since a history cursor, resolved to each message's
/// final inbox state. An id appears in at most one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryDelta {
    /// Messages whose last event put them in the inbox.
    pub added_ids: Vec<String>,
    /// Messages whose last event took them out of the inbox or deleted them.
    pub removed_ids: Vec<String>,
    pub new_cursor: u64,
}

#[async_trait]
pub trait MailRemote: Send + Sync {
    /// Up to `max` ids matching `query` and carrying every label in `labels`.
    async fn list_ids(
        &self,
        query: &str,
        labels: &[&str],
        max: u32,
    ) -> Result<Vec<String>, EmailError>;

    /// Every matching id, following continuation tokens to the end.
    async fn list_all_ids(&self, query: &str, labels: &[&str]) -> Result<Vec<String>, EmailError>;

    /// Metadata for every id. Fails as a whole if any single fetch fails;
    /// result order is unspecified.
    async fn get_details(&self, ids: &[String]) -> Result<Vec<RemoteMessage>, EmailError>;

    /// Readable body: plain text if present, sanitised HTML otherwise, else empty.
    async fn get_full_body(&self, id: &str) -> Result<String, EmailError>;

    async fn trash(&self, id: &str) -> Result<(), EmailError>;
    async fn untrash(&self, id: &str) -> Result<(), EmailError>;
    async fn archive(&self, id: &str) -> Result<(), EmailError>;
    async fn unarchive(&self, id: &str) -> Result<(), EmailError>;
    async fn mark_read(&self, id: &str) -> Result<(), EmailError>;
    async fn mark_unread(&self, id: &str) -> Result<(), EmailError>;
    async fn delete_permanently(&self, id: &str) -> Result<(), EmailError>;
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError>;

    async fn has_label(&self, id: &str, label: &str) -> Result<bool, EmailError>;
    async fn label_count(&self, label: &str) -> Result<u64, EmailError>;
    /// Messages outside inbox, spam and trash. There is no counter for this
    /// on the remote, so it is derived from a full id listing.
    async fn count_archived(&self) -> Result<u64, EmailError>;

    /// Fails with [`EmailError::StaleCursor`] when the remote no longer
    /// recognises `since`.
    async fn history_delta(&self, since: u64) -> Result<HistoryDelta, EmailError>;

    /// The mailbox's current history cursor.
    async fn current_cursor(&self) -> Result<u64, EmailError>;
}
