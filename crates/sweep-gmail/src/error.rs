use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} failed with status {status}")]
    Status { status: u16, context: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("history cursor {0} is no longer valid")]
    StaleCursor(u64),
    #[error("mail parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),
    #[error("message build error: {0}")]
    Build(String),
    #[error("invalid data: {0}")]
    Data(String),
}

impl EmailError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
