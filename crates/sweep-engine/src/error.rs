use sweep_gmail::EmailError;
use sweep_security::SecurityError;
use sweep_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("remote mail error: {0}")]
    Remote(#[from] EmailError),
    #[error("secret store error: {0}")]
    Secrets(#[from] SecurityError),
    #[error("no access token stored for {0}")]
    MissingToken(String),
    #[error("sync for {user} timed out after {secs}s")]
    Timeout { user: String, secs: u64 },
    #[error("could not establish a history cursor for {0}")]
    CursorUnavailable(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid unsubscribe target: {0}")]
    InvalidUnsubscribe(String),
}
