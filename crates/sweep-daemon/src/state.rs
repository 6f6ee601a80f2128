use anyhow::Context;
use std::sync::Arc;
use sweep_config::{AppConfig, ConfigManager};
use sweep_engine::{KeychainConnector, SweepEngine};
use sweep_security::SecretStore;
use sweep_storage::Storage;

pub struct DaemonState {
    pub(crate) config: AppConfig,
    pub(crate) engine: SweepEngine,
}

impl DaemonState {
    pub async fn initialize() -> anyhow::Result<Self> {
        let config_manager = ConfigManager::new().context("initialize config manager")?;
        let config = config_manager.load().context("load app config")?;

        let db_path = config_manager.data_dir().join(&config.database.file_name);
        let storage = Storage::connect(&db_path, config.database.max_connections)
            .await
            .context("initialize sqlite storage")?;

        let secrets = SecretStore::new(config.secrets.service_name.clone());
        let connector = KeychainConnector::new(secrets, &config);
        let engine = SweepEngine::new(&config, Arc::new(storage), Arc::new(connector))
            .context("build sweep engine")?;

        tracing::info!(
            config = %config_manager.config_path().display(),
            database = %db_path.display(),
            timezone = %config.scheduler.timezone,
            "daemon initialized"
        );

        Ok(Self { config, engine })
    }
}
