use crate::{MailStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use sweep_core::{
    AutomationFrequency, CachedMessage, CleaningHistoryRecord, MessagePage, MessageQuery, NewRule,
    Rule, RuleAction, RuleUpdate, SenderCount, SettingsUpdate, TrashOrigin, UserSettings,
};
use uuid::Uuid;

const TIME_OF_DAY_FORMAT: &str = "%H:%M";

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(db_path: &Path, max_connections: u32) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(path = %db_path.display(), "opened mailbox store");

        Ok(Self { pool })
    }

    /// Single-connection in-memory database. The connection is never
    /// recycled, otherwise the data would vanish with it.
    pub async fn connect_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_message(row: SqliteRow) -> Result<CachedMessage, StorageError> {
        let date_raw: String = row.try_get("date")?;
        let created_raw: String = row.try_get("created_at")?;
        let updated_raw: String = row.try_get("updated_at")?;

        Ok(CachedMessage {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            sender: row.try_get("sender")?,
            subject: row.try_get("subject")?,
            snippet: row.try_get("snippet")?,
            date: parse_datetime(&date_raw, "messages.date")?,
            read: row.try_get::<i64, _>("read")? != 0,
            was_in_inbox: row.try_get::<i64, _>("was_in_inbox")? != 0,
            created_at: parse_datetime(&created_raw, "messages.created_at")?,
            updated_at: parse_datetime(&updated_raw, "messages.updated_at")?,
        })
    }

    fn row_to_rule(row: SqliteRow) -> Result<Rule, StorageError> {
        let id_raw: String = row.try_get("id")?;
        let kind_raw: String = row.try_get("kind")?;
        let action_raw: String = row.try_get("action")?;
        let created_raw: String = row.try_get("created_at")?;
        let updated_raw: String = row.try_get("updated_at")?;

        Ok(Rule {
            id: parse_uuid(&id_raw, "rules.id")?,
            user_id: row.try_get("user_id")?,
            kind: kind_raw.into(),
            value: row.try_get("value")?,
            action: RuleAction::from_str(&action_raw)
                .map_err(|err| StorageError::Data(format!("invalid rules.action: {err}")))?,
            age_days: row.try_get::<i64, _>("age_days")? as i32,
            position: row.try_get::<i64, _>("position")? as i32,
            created_at: parse_datetime(&created_raw, "rules.created_at")?,
            updated_at: parse_datetime(&updated_raw, "rules.updated_at")?,
        })
    }

    fn row_to_history(row: SqliteRow) -> Result<CleaningHistoryRecord, StorageError> {
        let id_raw: String = row.try_get("id")?;
        let timestamp_raw: String = row.try_get("timestamp")?;
        let affected_raw: String = row.try_get("affected_ids_json")?;

        Ok(CleaningHistoryRecord {
            id: parse_uuid(&id_raw, "cleaning_history.id")?,
            user_id: row.try_get("user_id")?,
            timestamp: parse_datetime(&timestamp_raw, "cleaning_history.timestamp")?,
            affected_ids: parse_json(&affected_raw, "cleaning_history.affected_ids_json")?,
        })
    }

    fn row_to_settings(row: SqliteRow) -> Result<UserSettings, StorageError> {
        let frequency_raw: String = row.try_get("frequency")?;
        let time_raw: String = row.try_get("time_of_day")?;
        let created_raw: String = row.try_get("created_at")?;
        let updated_raw: String = row.try_get("updated_at")?;

        Ok(UserSettings {
            user_id: row.try_get("user_id")?,
            automation_enabled: row.try_get::<i64, _>("automation_enabled")? != 0,
            frequency: AutomationFrequency::from_str(&frequency_raw).map_err(|err| {
                StorageError::Data(format!("invalid user_settings.frequency: {err}"))
            })?,
            time_of_day: parse_time_of_day(&time_raw)?,
            history_cursor: row.try_get::<i64, _>("history_cursor")?.max(0) as u64,
            last_fired_slot: row.try_get("last_fired_slot")?,
            created_at: parse_datetime(&created_raw, "user_settings.created_at")?,
            updated_at: parse_datetime(&updated_raw, "user_settings.updated_at")?,
        })
    }

    async fn fetch_rule(&self, user_id: &str, rule_id: Uuid) -> Result<Rule, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, kind, value, action, age_days, position, created_at, updated_at
            FROM rules
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(rule_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("rule {rule_id}")))?;

        Self::row_to_rule(row)
    }
}

#[async_trait]
impl MailStore for Storage {
    async fn list_rules(&self, user_id: &str) -> Result<Vec<Rule>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, value, action, age_days, position, created_at, updated_at
            FROM rules
            WHERE user_id = ?1
            ORDER BY position ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_rule).collect()
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, StorageError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let position: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rules (
              id, user_id, kind, value, action, age_days, position, created_at, updated_at
            ) VALUES (
              ?1, ?2, ?3, ?4, ?5, ?6,
              COALESCE(?7, (SELECT COALESCE(MAX(position), -1) + 1 FROM rules WHERE user_id = ?2)),
              ?8, ?8
            )
            RETURNING position
            "#,
        )
        .bind(id.to_string())
        .bind(&rule.user_id)
        .bind(rule.kind.as_str())
        .bind(&rule.value)
        .bind(rule.action.as_str())
        .bind(i64::from(rule.age_days.max(0)))
        .bind(rule.position.map(i64::from))
        .bind(fmt_ts(&now))
        .fetch_one(&self.pool)
        .await?;

        Ok(Rule {
            id,
            user_id: rule.user_id.clone(),
            kind: rule.kind.clone(),
            value: rule.value.clone(),
            action: rule.action,
            age_days: rule.age_days.max(0),
            position: position as i32,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_rule(
        &self,
        user_id: &str,
        rule_id: Uuid,
        update: &RuleUpdate,
    ) -> Result<Rule, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET kind = ?3,
                value = ?4,
                action = ?5,
                age_days = ?6,
                position = COALESCE(?7, position),
                updated_at = ?8
            WHERE id = ?1 AND user_id = ?2
            "#,
        )
        .bind(rule_id.to_string())
        .bind(user_id)
        .bind(update.kind.as_str())
        .bind(&update.value)
        .bind(update.action.as_str())
        .bind(i64::from(update.age_days.max(0)))
        .bind(update.position.map(i64::from))
        .bind(fmt_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("rule {rule_id}")));
        }

        self.fetch_rule(user_id, rule_id).await
    }

    async fn delete_rule(&self, user_id: &str, rule_id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?1 AND user_id = ?2")
            .bind(rule_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("rule {rule_id}")));
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        user_id: &str,
        query: &MessageQuery,
    ) -> Result<MessagePage, StorageError> {
        let pattern = query
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
            .map(|filter| format!("%{filter}%"));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE user_id = ?1
              AND (?2 IS NULL OR subject LIKE ?2 OR sender LIKE ?2)
            "#,
        )
        .bind(user_id)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, sender, subject, snippet, date, read, was_in_inbox,
                   created_at, updated_at
            FROM messages
            WHERE user_id = ?1
              AND (?2 IS NULL OR subject LIKE ?2 OR sender LIKE ?2)
            ORDER BY date DESC, id ASC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(user_id)
        .bind(pattern.as_deref())
        .bind(i64::from(query.page_size.max(1)))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(MessagePage {
            total: total.max(0) as usize,
            items: rows
                .into_iter()
                .map(Self::row_to_message)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    async fn list_all_messages(&self, user_id: &str) -> Result<Vec<CachedMessage>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, sender, subject, snippet, date, read, was_in_inbox,
                   created_at, updated_at
            FROM messages
            WHERE user_id = ?1
            ORDER BY date DESC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn upsert_messages(&self, messages: &[CachedMessage]) -> Result<(), StorageError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO messages (
                  user_id, id, sender, subject, snippet, date, read, was_in_inbox,
                  created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(user_id, id) DO UPDATE SET
                  sender = excluded.sender,
                  subject = excluded.subject,
                  snippet = excluded.snippet,
                  date = excluded.date,
                  read = excluded.read,
                  was_in_inbox = excluded.was_in_inbox,
                  updated_at = excluded.updated_at
                "#,
            )
            .bind(&message.user_id)
            .bind(&message.id)
            .bind(&message.sender)
            .bind(&message.subject)
            .bind(&message.snippet)
            .bind(fmt_ts(&message.date))
            .bind(i64::from(message.read))
            .bind(i64::from(message.was_in_inbox))
            .bind(fmt_ts(&message.created_at))
            .bind(fmt_ts(&message.updated_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM messages WHERE user_id = ?1 AND id = ?2")
            .bind(user_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_messages(&self, user_id: &str) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn top_senders(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<SenderCount>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT sender, COUNT(*) AS total
            FROM messages
            WHERE user_id = ?1
            GROUP BY sender
            ORDER BY total DESC, sender ASC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, StorageError>(SenderCount {
                    sender: row.try_get("sender")?,
                    count: row.try_get::<i64, _>("total")?.max(0) as u64,
                })
            })
            .collect()
    }

    async fn append_cleaning_history(
        &self,
        user_id: &str,
        affected_ids: &[String],
    ) -> Result<CleaningHistoryRecord, StorageError> {
        let record = CleaningHistoryRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            affected_ids: affected_ids.to_vec(),
        };

        sqlx::query(
            r#"
            INSERT INTO cleaning_history (id, user_id, timestamp, affected_ids_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(fmt_ts(&record.timestamp))
        .bind(serde_json::to_string(&record.affected_ids)?)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_cleaning_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<CleaningHistoryRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, timestamp, affected_ids_json
            FROM cleaning_history
            WHERE user_id = ?1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }

    async fn get_settings(&self, user_id: &str) -> Result<UserSettings, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, automation_enabled, frequency, time_of_day, history_cursor,
                   last_fired_slot, created_at, updated_at
            FROM user_settings
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_settings(row),
            None => Ok(UserSettings::defaults(user_id)),
        }
    }

    async fn upsert_settings(&self, settings: &UserSettings) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (
              user_id, automation_enabled, frequency, time_of_day, history_cursor,
              last_fired_slot, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id) DO UPDATE SET
              automation_enabled = excluded.automation_enabled,
              frequency = excluded.frequency,
              time_of_day = excluded.time_of_day,
              history_cursor = excluded.history_cursor,
              last_fired_slot = excluded.last_fired_slot,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.user_id)
        .bind(i64::from(settings.automation_enabled))
        .bind(settings.frequency.as_str())
        .bind(settings.time_of_day.format(TIME_OF_DAY_FORMAT).to_string())
        .bind(cursor_to_db(settings.history_cursor)?)
        .bind(settings.last_fired_slot.as_deref())
        .bind(fmt_ts(&settings.created_at))
        .bind(fmt_ts(&settings.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_settings(
        &self,
        user_id: &str,
        update: &SettingsUpdate,
    ) -> Result<UserSettings, StorageError> {
        let now = fmt_ts(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO user_settings (
              user_id, automation_enabled, frequency, time_of_day, history_cursor,
              last_fired_slot, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
              automation_enabled = excluded.automation_enabled,
              frequency = excluded.frequency,
              time_of_day = excluded.time_of_day,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(i64::from(update.automation_enabled))
        .bind(update.frequency.as_str())
        .bind(update.time_of_day.format(TIME_OF_DAY_FORMAT).to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_settings(user_id).await
    }

    async fn update_history_cursor(
        &self,
        user_id: &str,
        cursor: u64,
    ) -> Result<(), StorageError> {
        let now = fmt_ts(&Utc::now());
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, history_cursor, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
              history_cursor = excluded.history_cursor,
              updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(cursor_to_db(cursor)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_automated_users(&self) -> Result<Vec<UserSettings>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, automation_enabled, frequency, time_of_day, history_cursor,
                   last_fired_slot, created_at, updated_at
            FROM user_settings
            WHERE automation_enabled = 1
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_settings).collect()
    }

    async fn claim_automation_slot(
        &self,
        user_id: &str,
        slot: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE user_settings
            SET last_fired_slot = ?2, updated_at = ?3
            WHERE user_id = ?1
              AND (last_fired_slot IS NULL OR last_fired_slot <> ?2)
            "#,
        )
        .bind(user_id)
        .bind(slot)
        .bind(fmt_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_trash_origin(
        &self,
        user_id: &str,
        message_id: &str,
        had_inbox: bool,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO trash_origins (user_id, message_id, had_inbox, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, message_id) DO UPDATE SET
              had_inbox = excluded.had_inbox,
              created_at = excluded.created_at
            "#,
        )
        .bind(user_id)
        .bind(message_id)
        .bind(i64::from(had_inbox))
        .bind(fmt_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_trash_origin(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<TrashOrigin>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, message_id, had_inbox, created_at
            FROM trash_origins
            WHERE user_id = ?1 AND message_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let created_raw: String = row.try_get("created_at")?;
            Ok::<_, StorageError>(TrashOrigin {
                user_id: row.try_get("user_id")?,
                message_id: row.try_get("message_id")?,
                had_inbox: row.try_get::<i64, _>("had_inbox")? != 0,
                created_at: parse_datetime(&created_raw, "trash_origins.created_at")?,
            })
        })
        .transpose()
    }

    async fn delete_trash_origin(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM trash_origins WHERE user_id = ?1 AND message_id = ?2")
            .bind(user_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn reset_all(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "messages",
            "rules",
            "cleaning_history",
            "user_settings",
            "trash_origins",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::warn!("all local mailbox data was reset");

        Ok(())
    }
}

fn fmt_ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn cursor_to_db(cursor: u64) -> Result<i64, StorageError> {
    i64::try_from(cursor)
        .map_err(|_| StorageError::Data(format!("history cursor {cursor} out of range")))
}

fn parse_time_of_day(raw: &str) -> Result<NaiveTime, StorageError> {
    NaiveTime::parse_from_str(raw, TIME_OF_DAY_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|err| {
            StorageError::Data(format!("invalid time for user_settings.time_of_day: {err}"))
        })
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw)
        .map_err(|err| StorageError::Data(format!("invalid uuid for {field}: {err}")))
}

fn parse_datetime(raw: &str, field: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StorageError::Data(format!("invalid datetime for {field}: {err}")))
}

fn parse_json<T>(raw: &str, field: &str) -> Result<T, StorageError>
where
    T: DeserializeOwned,
{
    serde_json::from_str(raw)
        .map_err(|err| StorageError::Data(format!("invalid json for {field}: {err}")))
}
