use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use sweep_core::CachedMessage;
use sweep_gmail::{labels, RemoteMessage};

/// Layouts tried in order after the trailing zone comment is dropped.
const HEADER_DATE_LAYOUTS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z"];

/// How a message whose Date header cannot be parsed is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateFallback {
    Skip,
    InternalDate,
}

/// Parses an RFC 5322 style Date header, tolerating a trailing
/// parenthesised zone name such as `(UTC)` or `(Pacific Standard Time)`.
pub fn parse_header_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    let cleaned = match zone_comment() {
        Some(pattern) => pattern.replace(trimmed, "").into_owned(),
        None => trimmed.to_string(),
    };
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    HEADER_DATE_LAYOUTS
        .iter()
        .find_map(|layout| DateTime::parse_from_str(cleaned, layout).ok())
        .or_else(|| DateTime::parse_from_rfc2822(cleaned).ok())
        .or_else(|| DateTime::parse_from_rfc3339(cleaned).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Removes NUL characters, which the store rejects in text columns.
pub fn strip_nulls(value: &str) -> String {
    value.replace('\0', "")
}

fn zone_comment() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\s*\([^()]*\)\s*$").ok())
        .as_ref()
}

pub(crate) fn to_cached(
    remote: &RemoteMessage,
    user_id: &str,
    now: DateTime<Utc>,
    fallback: DateFallback,
) -> Option<CachedMessage> {
    let header_date = remote.header("Date").and_then(parse_header_date);
    let date = match (header_date, fallback) {
        (Some(date), _) => date,
        (None, DateFallback::InternalDate) => remote.internal_date?,
        (None, DateFallback::Skip) => return None,
    };

    Some(CachedMessage {
        id: remote.id.clone(),
        user_id: user_id.to_string(),
        sender: strip_nulls(remote.header("From").unwrap_or_default()),
        subject: strip_nulls(remote.header("Subject").unwrap_or_default()),
        snippet: strip_nulls(&remote.snippet),
        date,
        read: !remote.has_label(labels::UNREAD),
        was_in_inbox: remote.has_label(labels::INBOX),
        created_at: now,
        updated_at: now,
    })
}

/// Maps a fetched batch, logging how many messages were dropped.
pub(crate) fn to_cached_batch(
    remotes: &[RemoteMessage],
    user_id: &str,
    fallback: DateFallback,
) -> Vec<CachedMessage> {
    let now = Utc::now();
    let mapped = remotes
        .iter()
        .filter_map(|remote| to_cached(remote, user_id, now, fallback))
        .collect::<Vec<_>>();

    let skipped = remotes.len() - mapped.len();
    if skipped > 0 {
        tracing::warn!(user = user_id, skipped, "skipped messages with unparsable dates");
    }
    mapped
}
