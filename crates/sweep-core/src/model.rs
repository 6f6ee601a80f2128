use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A cached copy of one remote message. The remote mailbox is the system of
/// record; rows here can be rebuilt from it at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMessage {
    pub id: String,
    pub user_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub date: DateTime<Utc>,
    pub read: bool,
    /// Whether the message carried the inbox label when it was synced.
    #[serde(default = "default_true")]
    pub was_in_inbox: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQuery {
    pub page: u32,
    pub page_size: u32,
    pub filter: Option<String>,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 25,
            filter: None,
        }
    }
}

impl MessageQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub total: usize,
    pub items: Vec<CachedMessage>,
}

// ---- Rules ----

/// What part of a message a rule inspects. Rows carrying a kind this build
/// does not know are kept as `Unknown` and never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    Sender,
    Subject,
    Keyword,
    Unknown(String),
}

impl RuleKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sender => "sender",
            Self::Subject => "subject",
            Self::Keyword => "keyword",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for RuleKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "sender" => Self::Sender,
            "subject" => Self::Subject,
            "keyword" => Self::Keyword,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for RuleKind {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    Delete,
    Archive,
    MarkRead,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Archive => "ARCHIVE",
            Self::MarkRead => "MARK_READ",
        }
    }
}

impl FromStr for RuleAction {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "DELETE" => Ok(Self::Delete),
            "ARCHIVE" => Ok(Self::Archive),
            "MARK_READ" => Ok(Self::MarkRead),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub id: Uuid,
    pub user_id: String,
    pub kind: RuleKind,
    pub value: String,
    pub action: RuleAction,
    /// Minimum message age in days; zero or less disables the age check.
    pub age_days: i32,
    /// Evaluation order within the user's rule set, ascending.
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub user_id: String,
    pub kind: RuleKind,
    pub value: String,
    pub action: RuleAction,
    #[serde(default)]
    pub age_days: i32,
    /// Appended after the user's existing rules when absent.
    #[serde(default)]
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub kind: RuleKind,
    pub value: String,
    pub action: RuleAction,
    pub age_days: i32,
    #[serde(default)]
    pub position: Option<i32>,
}

// ---- Automation settings ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationFrequency {
    Hourly,
    Daily,
    Weekly,
}

impl AutomationFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl FromStr for AutomationFrequency {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for AutomationFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSettings {
    pub user_id: String,
    pub automation_enabled: bool,
    pub frequency: AutomationFrequency,
    /// Wall-clock time in the scheduler's reference timezone.
    pub time_of_day: NaiveTime,
    /// Remote history cursor; zero until the first successful sync.
    pub history_cursor: u64,
    /// Slot key of the most recent automated cleanup that was started.
    pub last_fired_slot: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn defaults(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            automation_enabled: false,
            frequency: AutomationFrequency::Daily,
            time_of_day: NaiveTime::MIN,
            history_cursor: 0,
            last_fired_slot: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub automation_enabled: bool,
    pub frequency: AutomationFrequency,
    pub time_of_day: NaiveTime,
}

// ---- Audit & trash bookkeeping ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleaningHistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub affected_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrashOrigin {
    pub user_id: String,
    pub message_id: String,
    pub had_inbox: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderCount {
    pub sender: String,
    pub count: u64,
}

// ---- Sync telemetry ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Full,
    Quick,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncProgress {
    #[serde(rename = "type")]
    pub kind: SyncKind,
    pub stage: String,
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
    pub in_progress: bool,
}

impl SyncProgress {
    pub fn new(kind: SyncKind, stage: impl Into<String>, current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64) * 100.0
        };

        Self {
            kind,
            stage: stage.into(),
            current,
            total,
            percentage,
            in_progress: current < total,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailboxStats {
    pub synced: u64,
    pub trash: u64,
    pub archived: u64,
}
