use crate::EngineError;
use async_trait::async_trait;
use std::sync::Arc;
use sweep_config::AppConfig;
use sweep_gmail::{BatchLimits, GmailClient, MailRemote};
use sweep_security::{SecretKey, SecretStore};

/// Resolves the remote mailbox for a user.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn MailRemote>, EngineError>;
}

/// Builds Gmail clients from access tokens kept in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeychainConnector {
    secrets: SecretStore,
    api_base: String,
    page_size: u32,
    limits: BatchLimits,
}

impl KeychainConnector {
    pub fn new(secrets: SecretStore, config: &AppConfig) -> Self {
        Self {
            secrets,
            api_base: config.gmail.api_base.clone(),
            page_size: config.gmail.list_page_size,
            limits: BatchLimits {
                concurrency: config.sync.detail_concurrency,
                chunk_size: config.sync.detail_chunk_size,
                chunk_pause: config.sync.chunk_pause(),
            },
        }
    }
}

#[async_trait]
impl RemoteConnector for KeychainConnector {
    async fn connect(&self, user_id: &str) -> Result<Arc<dyn MailRemote>, EngineError> {
        let token = self
            .secrets
            .get(&SecretKey::access_token(user_id))?
            .ok_or_else(|| EngineError::MissingToken(user_id.to_string()))?;

        let client = GmailClient::new(token)
            .with_api_base(&self.api_base)
            .with_page_size(self.page_size)
            .with_batch_limits(self.limits.clone());

        Ok(Arc::new(client))
    }
}
