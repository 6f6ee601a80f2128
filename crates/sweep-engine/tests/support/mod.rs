#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use sweep_config::AppConfig;
use sweep_core::{CachedMessage, NewRule, RuleAction, RuleKind};
use sweep_engine::{EngineError, RemoteConnector, SweepEngine};
use sweep_gmail::{
    labels, EmailError, HistoryDelta, MailRemote, MessageHeader, OutgoingMail, RemoteMessage,
};
use sweep_storage::{MailStore, Storage};

pub const USER: &str = "owner@example.com";

#[derive(Default)]
pub struct FakeState {
    pub messages: BTreeMap<String, RemoteMessage>,
    pub history: HistoryDelta,
    pub stale_cursor: bool,
    pub profile_cursor: u64,
    /// Ids whose mutations fail with a server error.
    pub failing: HashSet<String>,
    /// Archive calls to ignore per id before the inbox label really goes.
    pub sticky_inbox: HashMap<String, u32>,
    /// Delay applied to every detail fetch.
    pub detail_delay: Option<Duration>,
    pub calls: Vec<String>,
    pub sent: Vec<OutgoingMail>,
}

/// In-memory mailbox standing in for the Gmail API.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, message: RemoteMessage) {
        self.state().messages.insert(message.id.clone(), message);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn labels_of(&self, id: &str) -> Option<Vec<String>> {
        self.state()
            .messages
            .get(id)
            .map(|message| message.label_ids.clone())
    }

    fn mutate(
        &self,
        verb: &str,
        id: &str,
        apply: impl FnOnce(&mut FakeState, &str) -> Result<(), EmailError>,
    ) -> Result<(), EmailError> {
        let mut state = self.state();
        state.calls.push(format!("{verb}:{id}"));
        if state.failing.contains(id) {
            return Err(EmailError::Status {
                status: 500,
                context: format!("{verb} {id}"),
            });
        }
        if !state.messages.contains_key(id) {
            return Err(EmailError::NotFound(id.to_string()));
        }
        apply(&mut *state, id)
    }

    fn matching(&self, wanted: &[&str]) -> Vec<String> {
        self.state()
            .messages
            .values()
            .filter(|message| wanted.iter().all(|label| message.has_label(label)))
            .map(|message| message.id.clone())
            .collect()
    }
}

fn add_label(state: &mut FakeState, id: &str, label: &str) {
    if let Some(message) = state.messages.get_mut(id) {
        if !message.has_label(label) {
            message.label_ids.push(label.to_string());
        }
    }
}

fn remove_label(state: &mut FakeState, id: &str, label: &str) {
    if let Some(message) = state.messages.get_mut(id) {
        message.label_ids.retain(|existing| existing != label);
    }
}

#[async_trait]
impl MailRemote for FakeRemote {
    async fn list_ids(
        &self,
        query: &str,
        labels: &[&str],
        max: u32,
    ) -> Result<Vec<String>, EmailError> {
        self.state().calls.push(format!("list:{query}"));
        let mut ids = self.matching(labels);
        ids.truncate(max as usize);
        Ok(ids)
    }

    async fn list_all_ids(&self, query: &str, labels: &[&str]) -> Result<Vec<String>, EmailError> {
        self.state().calls.push(format!("list_all:{query}"));
        Ok(self.matching(labels))
    }

    async fn get_details(&self, ids: &[String]) -> Result<Vec<RemoteMessage>, EmailError> {
        let delay = self.state().detail_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        ids.iter()
            .map(|id| {
                state
                    .messages
                    .get(id)
                    .cloned()
                    .ok_or_else(|| EmailError::NotFound(id.clone()))
            })
            .collect()
    }

    async fn get_full_body(&self, _id: &str) -> Result<String, EmailError> {
        Ok(String::new())
    }

    async fn trash(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("trash", id, |state, id| {
            remove_label(state, id, labels::INBOX);
            add_label(state, id, labels::TRASH);
            Ok(())
        })
    }

    async fn untrash(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("untrash", id, |state, id| {
            remove_label(state, id, labels::TRASH);
            Ok(())
        })
    }

    async fn archive(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("archive", id, |state, id| {
            if let Some(remaining) = state.sticky_inbox.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(());
                }
            }
            remove_label(state, id, labels::INBOX);
            Ok(())
        })
    }

    async fn unarchive(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("unarchive", id, |state, id| {
            add_label(state, id, labels::INBOX);
            Ok(())
        })
    }

    async fn mark_read(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("mark_read", id, |state, id| {
            remove_label(state, id, labels::UNREAD);
            Ok(())
        })
    }

    async fn mark_unread(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("mark_unread", id, |state, id| {
            add_label(state, id, labels::UNREAD);
            Ok(())
        })
    }

    async fn delete_permanently(&self, id: &str) -> Result<(), EmailError> {
        self.mutate("delete", id, |state, id| {
            state.messages.remove(id);
            Ok(())
        })
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        let mut state = self.state();
        state.calls.push(format!("send:{}", mail.to.join(",")));
        state.sent.push(mail.clone());
        Ok(())
    }

    async fn has_label(&self, id: &str, label: &str) -> Result<bool, EmailError> {
        let mut state = self.state();
        state.calls.push(format!("has_label:{id}"));
        state
            .messages
            .get(id)
            .map(|message| message.has_label(label))
            .ok_or_else(|| EmailError::NotFound(id.to_string()))
    }

    async fn label_count(&self, label: &str) -> Result<u64, EmailError> {
        Ok(self.matching(&[label]).len() as u64)
    }

    async fn count_archived(&self) -> Result<u64, EmailError> {
        let state = self.state();
        let count = state
            .messages
            .values()
            .filter(|message| {
                !message.has_label(labels::INBOX)
                    && !message.has_label(labels::SPAM)
                    && !message.has_label(labels::TRASH)
            })
            .count();
        Ok(count as u64)
    }

    async fn history_delta(&self, since: u64) -> Result<HistoryDelta, EmailError> {
        let mut state = self.state();
        state.calls.push(format!("history:{since}"));
        if state.stale_cursor {
            return Err(EmailError::StaleCursor(since));
        }
        Ok(state.history.clone())
    }

    async fn current_cursor(&self) -> Result<u64, EmailError> {
        Ok(self.state().profile_cursor)
    }
}

pub struct FakeConnector {
    remote: Arc<FakeRemote>,
    /// Users treated as having no stored token.
    pub refused: Mutex<HashSet<String>>,
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn MailRemote>, EngineError> {
        if self.refused.lock().unwrap().contains(user_id) {
            return Err(EngineError::MissingToken(user_id.to_string()));
        }
        Ok(self.remote.clone())
    }
}

pub struct Harness {
    pub store: Arc<Storage>,
    pub remote: Arc<FakeRemote>,
    pub connector: Arc<FakeConnector>,
    pub engine: SweepEngine,
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

pub async fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let mut config = AppConfig::default();
    config.sync.archive_verify_backoff_ms = 1;
    config.sync.timeout_secs = 5;
    configure(&mut config);

    let store = Arc::new(Storage::connect_in_memory().await.unwrap());
    let remote = FakeRemote::new();
    let connector = Arc::new(FakeConnector {
        remote: remote.clone(),
        refused: Mutex::new(HashSet::new()),
    });
    let engine = SweepEngine::new(&config, store.clone(), connector.clone()).unwrap();

    Harness {
        store,
        remote,
        connector,
        engine,
    }
}

pub fn remote_message(id: &str, from: &str, subject: &str, history_id: u64) -> RemoteMessage {
    RemoteMessage {
        id: id.to_string(),
        thread_id: Some(format!("t-{id}")),
        snippet: format!("snippet for {id}"),
        label_ids: vec![labels::INBOX.to_string(), labels::UNREAD.to_string()],
        history_id,
        internal_date: Some(Utc::now()),
        headers: vec![
            header("From", from),
            header("Subject", subject),
            header("Date", "Wed, 01 May 2024 09:30:00 +0000"),
        ],
    }
}

pub fn header(name: &str, value: &str) -> MessageHeader {
    MessageHeader {
        name: name.to_string(),
        value: value.to_string(),
    }
}

pub fn cached(id: &str, sender: &str, subject: &str, date: DateTime<Utc>) -> CachedMessage {
    CachedMessage {
        id: id.to_string(),
        user_id: USER.to_string(),
        sender: sender.to_string(),
        subject: subject.to_string(),
        snippet: String::new(),
        date,
        read: false,
        was_in_inbox: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn add_rule(store: &Storage, kind: RuleKind, value: &str, action: RuleAction) {
    store
        .create_rule(&NewRule {
            user_id: USER.to_string(),
            kind,
            value: value.to_string(),
            action,
            age_days: 0,
            position: None,
        })
        .await
        .unwrap();
}

pub async fn cached_ids(store: &Storage) -> Vec<String> {
    let mut ids: Vec<String> = store
        .list_all_messages(USER)
        .await
        .unwrap()
        .into_iter()
        .map(|message| message.id)
        .collect();
    ids.sort();
    ids
}
