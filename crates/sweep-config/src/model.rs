use crate::ConfigError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub version: u32,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub gmail: GmailConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub file_name: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub timeout_secs: u64,
    /// Window used to reseed the history cursor when it is missing or stale.
    pub fallback_window_days: u32,
    pub fallback_max_results: u32,
    pub detail_concurrency: usize,
    pub detail_chunk_size: usize,
    pub chunk_pause_ms: u64,
    pub archive_verify_retries: u32,
    pub archive_verify_backoff_ms: u64,
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }

    pub fn archive_verify_backoff(&self) -> Duration {
        Duration::from_millis(self.archive_verify_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    /// IANA zone the users' configured times of day are read in.
    pub timezone: String,
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn reference_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| ConfigError::Invalid {
                field: "scheduler.timezone",
                reason: err.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    pub api_base: String,
    pub list_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    pub service_name: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            service_name: "io.mailsweep.daemon".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.reference_timezone()?;

        url::Url::parse(&self.gmail.api_base).map_err(|err| ConfigError::Invalid {
            field: "gmail.api_base",
            reason: err.to_string(),
        })?;

        if self.sync.detail_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.detail_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sync.detail_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.detail_chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.tick_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=500).contains(&self.gmail.list_page_size) {
            return Err(ConfigError::Invalid {
                field: "gmail.list_page_size",
                reason: "must be between 1 and 500".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            database: DatabaseConfig {
                file_name: "mailsweep.sqlite3".to_string(),
                max_connections: 16,
            },
            sync: SyncConfig {
                timeout_secs: 300,
                fallback_window_days: 7,
                fallback_max_results: 500,
                detail_concurrency: 10,
                detail_chunk_size: 100,
                chunk_pause_ms: 100,
                archive_verify_retries: 3,
                archive_verify_backoff_ms: 300,
            },
            scheduler: SchedulerConfig {
                tick_secs: 60,
                timezone: "Asia/Kolkata".to_string(),
            },
            gmail: GmailConfig {
                api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
                list_page_size: 500,
            },
            secrets: SecretsConfig::default(),
        }
    }
}
