use crate::{AppConfig, ConfigError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "MailSweep";
const APP: &str = "MailSweep";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        Self::with_dirs(dirs.config_dir(), dirs.data_dir(), dirs.cache_dir())
    }

    /// Lays the config out under explicit directories instead of the
    /// platform defaults.
    pub fn with_dirs(
        config_dir: &Path,
        data_dir: &Path,
        cache_dir: &Path,
    ) -> Result<Self, ConfigError> {
        fs::create_dir_all(config_dir)?;
        fs::create_dir_all(data_dir)?;
        fs::create_dir_all(cache_dir)?;

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            let initial = AppConfig::default();
            let content = toml::to_string_pretty(&initial)?;
            fs::write(&config_path, content)?;
            tracing::info!(path = %config_path.display(), "wrote default config");
        }

        Ok(Self {
            config_path,
            data_dir: data_dir.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigManager;
    use crate::AppConfig;

    fn manager_in(root: &tempfile::TempDir) -> ConfigManager {
        let root = root.path();
        ConfigManager::with_dirs(&root.join("config"), &root.join("data"), &root.join("cache"))
            .expect("manager")
    }

    #[test]
    fn writes_default_config_on_first_run() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = manager_in(&root);

        assert!(manager.config_path().exists());
        let loaded = manager.load().expect("load default");
        assert_eq!(loaded.scheduler.timezone, "Asia/Kolkata");
        assert_eq!(loaded.sync.detail_concurrency, 10);
    }

    #[test]
    fn save_rejects_unknown_timezone() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = manager_in(&root);

        let mut config = AppConfig::default();
        config.scheduler.timezone = "Mars/Olympus_Mons".to_string();
        assert!(manager.save(&config).is_err());
    }
}
