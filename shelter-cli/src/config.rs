use anyhow::{Context, Result};
use config::{Config, Environment, File};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use shelter_engine::EngineConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,

    pub store: StoreConfig,

    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the proxy listens on
    pub listen: String,

    /// Seconds between automatic background syncs, 0 disables them
    pub sync_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            sync_interval_secs: 0,
        }
    }
}

impl ServerConfig {
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the file store. The memory store is used when unset.
    pub cache_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        } else if let Some(default_path) = Self::default_config_path() {
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }

        // Add environment variables with SHELTER prefix, e.g. SHELTER_ENGINE__VERSION
        builder = builder.add_source(
            Environment::with_prefix("SHELTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("shelter").join("config.toml"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, toml_string).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Show current configuration as a formatted string
    pub fn show(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration for display")
    }
}
