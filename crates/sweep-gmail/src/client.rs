use crate::pager::PageState;
use crate::remote::labels;
use crate::{
    encode_raw_message, fan_out, readable_body, BatchLimits, EmailError, HistoryDelta, IdPager,
    MailRemote, MessageHeader, OutgoingMail, RemoteMessage,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const MAX_PAGE_SIZE: u32 = 500;
const DETAIL_FIELDS: &str = "id,threadId,snippet,labelIds,historyId,internalDate,payload/headers";
const ARCHIVED_QUERY: &str = "-in:inbox -in:spam -in:trash";

/// Gmail REST client bound to one user's access token.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
    page_size: u32,
    limits: BatchLimits,
}

impl std::fmt::Debug for GmailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailClient")
            .field("api_base", &self.api_base)
            .field("access_token", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("limits", &self.limits)
            .finish()
    }
}

pub(crate) struct ListPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: access_token.into(),
            page_size: MAX_PAGE_SIZE,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn pager(&self, query: &str, labels: &[&str]) -> IdPager<'_> {
        IdPager::new(self, query, labels, self.page_size)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.api_base)
    }

    pub(crate) async fn list_page(
        &self,
        query: &str,
        labels: &[String],
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, EmailError> {
        let mut params = vec![("maxResults", page_size.min(MAX_PAGE_SIZE).to_string())];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }
        for label in labels {
            params.push(("labelIds", label.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(self.url("messages"))
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;
        let payload: ListMessagesResponse = ensure_success(response, "list messages")
            .await?
            .json()
            .await?;

        Ok(ListPage {
            ids: payload
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|message| message.id)
                .collect(),
            next_page_token: payload.next_page_token,
        })
    }

    async fn get_metadata(&self, id: &str) -> Result<RemoteMessage, EmailError> {
        let response = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "Date"),
                ("fields", DETAIL_FIELDS),
            ])
            .send()
            .await?;
        let payload: MessageResponse = ensure_success(response, &format!("get message {id}"))
            .await?
            .json()
            .await?;

        Ok(payload.into_remote())
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), EmailError> {
        let response = self
            .http
            .post(self.url(&format!("messages/{id}/modify")))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "addLabelIds": add,
                "removeLabelIds": remove,
            }))
            .send()
            .await?;
        ensure_success(response, &format!("modify labels on {id}")).await?;
        Ok(())
    }

    async fn post_empty(&self, path: &str, context: &str) -> Result<(), EmailError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        ensure_success(response, context).await?;
        Ok(())
    }
}

#[async_trait]
impl MailRemote for GmailClient {
    async fn list_ids(
        &self,
        query: &str,
        labels: &[&str],
        max: u32,
    ) -> Result<Vec<String>, EmailError> {
        let limit = max as usize;
        let mut pager = IdPager::new(self, query, labels, self.page_size.min(max.max(1)));
        let mut ids = Vec::new();

        while ids.len() < limit {
            match pager.next_page().await? {
                Some(page) => ids.extend(page),
                None => break,
            }
        }
        ids.truncate(limit);

        Ok(ids)
    }

    async fn list_all_ids(&self, query: &str, labels: &[&str]) -> Result<Vec<String>, EmailError> {
        let mut pager = self.pager(query, labels);
        let mut ids = Vec::new();
        let mut pages = 0usize;

        while let Some(page) = pager.next_page().await? {
            pages += 1;
            ids.extend(page);
        }
        tracing::debug!(query, pages, total = ids.len(), "listed message ids");

        Ok(ids)
    }

    async fn get_details(&self, ids: &[String]) -> Result<Vec<RemoteMessage>, EmailError> {
        let client = self.clone();
        fan_out(ids, &self.limits, move |id| {
            let client = client.clone();
            async move { client.get_metadata(&id).await }
        })
        .await
    }

    async fn get_full_body(&self, id: &str) -> Result<String, EmailError> {
        let response = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("format", "raw")])
            .send()
            .await?;
        let payload: RawMessageResponse = ensure_success(response, &format!("get raw {id}"))
            .await?
            .json()
            .await?;

        match payload.raw {
            Some(raw) => readable_body(&raw),
            None => Ok(String::new()),
        }
    }

    async fn trash(&self, id: &str) -> Result<(), EmailError> {
        self.post_empty(&format!("messages/{id}/trash"), &format!("trash {id}"))
            .await
    }

    async fn untrash(&self, id: &str) -> Result<(), EmailError> {
        self.post_empty(&format!("messages/{id}/untrash"), &format!("untrash {id}"))
            .await
    }

    async fn archive(&self, id: &str) -> Result<(), EmailError> {
        self.modify_labels(id, &[], &[labels::INBOX]).await
    }

    async fn unarchive(&self, id: &str) -> Result<(), EmailError> {
        self.modify_labels(id, &[labels::INBOX], &[]).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), EmailError> {
        self.modify_labels(id, &[], &[labels::UNREAD]).await
    }

    async fn mark_unread(&self, id: &str) -> Result<(), EmailError> {
        self.modify_labels(id, &[labels::UNREAD], &[]).await
    }

    async fn delete_permanently(&self, id: &str) -> Result<(), EmailError> {
        let response = self
            .http
            .delete(self.url(&format!("messages/{id}")))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        ensure_success(response, &format!("delete {id}")).await?;
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        let raw = encode_raw_message(mail)?;
        let response = self
            .http
            .post(self.url("messages/send"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        ensure_success(response, "send message").await?;
        Ok(())
    }

    async fn has_label(&self, id: &str, label: &str) -> Result<bool, EmailError> {
        let response = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("format", "minimal"), ("fields", "labelIds")])
            .send()
            .await?;
        let payload: MessageResponse = ensure_success(response, &format!("get labels {id}"))
            .await?
            .json()
            .await?;

        Ok(payload
            .label_ids
            .unwrap_or_default()
            .iter()
            .any(|existing| existing == label))
    }

    async fn label_count(&self, label: &str) -> Result<u64, EmailError> {
        let response = self
            .http
            .get(self.url(&format!("labels/{label}")))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let payload: LabelResponse = ensure_success(response, &format!("get label {label}"))
            .await?
            .json()
            .await?;

        Ok(payload.messages_total.unwrap_or(0))
    }

    async fn count_archived(&self) -> Result<u64, EmailError> {
        let ids = self.list_all_ids(ARCHIVED_QUERY, &[]).await?;
        Ok(ids.len() as u64)
    }

    async fn history_delta(&self, since: u64) -> Result<HistoryDelta, EmailError> {
        let mut state = PageState::First;
        let mut records = Vec::new();
        let mut new_cursor = since;

        while state != PageState::Exhausted {
            let mut params = vec![("startHistoryId", since.to_string())];
            if let Some(token) = state.token() {
                params.push(("pageToken", token.to_string()));
            }

            let response = self
                .http
                .get(self.url("history"))
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;
            if matches!(
                response.status(),
                StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
            ) {
                return Err(EmailError::StaleCursor(since));
            }
            let page: HistoryResponse = ensure_success(response, "list history")
                .await?
                .json()
                .await?;

            if page.history_id > 0 {
                new_cursor = page.history_id;
            }
            records.extend(page.history.unwrap_or_default());
            state = PageState::advance(page.next_page_token);
        }

        Ok(collect_delta(records, new_cursor))
    }

    async fn current_cursor(&self) -> Result<u64, EmailError> {
        let response = self
            .http
            .get(self.url("profile"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let profile: ProfileResponse = ensure_success(response, "get profile")
            .await?
            .json()
            .await?;

        Ok(profile.history_id)
    }
}

async fn ensure_success(response: Response, context: &str) -> Result<Response, EmailError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(EmailError::NotFound(context.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), context, body = %body, "remote call rejected");
    Err(EmailError::Status {
        status: status.as_u16(),
        context: context.to_string(),
    })
}

/// Replays history records in history id order and keeps the last inbox
/// event seen for each message. An id ends up in exactly one of the two
/// lists, ordered by first appearance.
fn collect_delta(mut records: Vec<HistoryRecord>, new_cursor: u64) -> HistoryDelta {
    records.sort_by_key(|record| record.id);

    let mut order: Vec<String> = Vec::new();
    let mut in_inbox: HashMap<String, bool> = HashMap::new();
    let mut settle = |id: String, present: bool| {
        if in_inbox.insert(id.clone(), present).is_none() {
            order.push(id);
        }
    };

    for record in records {
        for entry in record.messages_added.unwrap_or_default() {
            if carries_inbox(&entry.message.label_ids) {
                settle(entry.message.id, true);
            }
        }
        for entry in record.labels_added.unwrap_or_default() {
            if carries_inbox(&entry.label_ids) {
                settle(entry.message.id, true);
            }
        }
        for entry in record.labels_removed.unwrap_or_default() {
            if carries_inbox(&entry.label_ids) {
                settle(entry.message.id, false);
            }
        }
        for entry in record.messages_deleted.unwrap_or_default() {
            settle(entry.message.id, false);
        }
    }

    let (added, removed): (Vec<String>, Vec<String>) = order
        .into_iter()
        .partition(|id| in_inbox.get(id).copied().unwrap_or(false));

    HistoryDelta {
        added_ids: added,
        removed_ids: removed,
        new_cursor,
    }
}

fn carries_inbox(label_ids: &[String]) -> bool {
    label_ids.iter().any(|label| label == labels::INBOX)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[serde(default)]
    label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    #[serde(default)]
    id: String,
    thread_id: Option<String>,
    snippet: Option<String>,
    label_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "de_u64_string")]
    history_id: u64,
    #[serde(default, deserialize_with = "de_u64_string")]
    internal_date: u64,
    payload: Option<MessagePayload>,
}

impl MessageResponse {
    fn into_remote(self) -> RemoteMessage {
        let internal_date = if self.internal_date > 0 {
            i64::try_from(self.internal_date)
                .ok()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        } else {
            None
        };

        RemoteMessage {
            id: self.id,
            thread_id: self.thread_id,
            snippet: self.snippet.unwrap_or_default(),
            label_ids: self.label_ids.unwrap_or_default(),
            history_id: self.history_id,
            internal_date,
            headers: self
                .payload
                .and_then(|payload| payload.headers)
                .unwrap_or_default()
                .into_iter()
                .map(|header| MessageHeader {
                    name: header.name,
                    value: header.value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    headers: Option<Vec<HeaderEntry>>,
}

#[derive(Debug, Deserialize)]
struct HeaderEntry {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawMessageResponse {
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelResponse {
    messages_total: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default, deserialize_with = "de_u64_string")]
    history_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    history: Option<Vec<HistoryRecord>>,
    next_page_token: Option<String>,
    #[serde(default, deserialize_with = "de_u64_string")]
    history_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(default, deserialize_with = "de_u64_string")]
    id: u64,
    messages_added: Option<Vec<HistoryMessage>>,
    messages_deleted: Option<Vec<HistoryMessage>>,
    labels_added: Option<Vec<HistoryLabelChange>>,
    labels_removed: Option<Vec<HistoryLabelChange>>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryLabelChange {
    message: MessageRef,
    #[serde(default)]
    label_ids: Vec<String>,
}

/// Google encodes 64-bit integers as JSON strings; accept either form.
fn de_u64_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) if text.is_empty() => Ok(0),
        Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}
