//! Host configuration: a typed struct loaded from the config file with
//! environment overrides. Runtime-mutable knobs live in the settings
//! relation, not here.

use std::path::PathBuf;

use betterspotlight_domain::{Error, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Data directory holding the store file and derived artifacts.
    pub data_dir: PathBuf,
    /// Directory containing the service binaries. Empty = next to the
    /// host executable.
    pub service_bin_dir: PathBuf,
    /// File roots to index.
    pub roots: Vec<PathBuf>,
    /// tracing env-filter directive.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            service_bin_dir: PathBuf::new(),
            roots: Vec::new(),
            log_filter: "info".to_owned(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("betterspotlight")
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("betterspotlight")
        .join("config.toml")
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Resolution order: defaults, then the TOML config file, then
    /// `BETTERSPOTLIGHT_*` environment variables (highest priority).
    ///
    /// # Errors
    ///
    /// Returns a config error when the file exists but cannot be parsed,
    /// or when validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path())
    }

    /// Load from an explicit config file path (tests).
    ///
    /// # Errors
    ///
    /// Returns a config error when parsing or validation fails.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BETTERSPOTLIGHT_").split("__"))
            .extract()
            .map_err(|e| Error::config(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::config("data_dir must not be empty"));
        }
        Ok(())
    }

    /// Resolve the path of a sibling service binary.
    #[must_use]
    pub fn service_binary(&self, name: &str) -> PathBuf {
        if self.service_bin_dir.as_os_str().is_empty() {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|d| d.join(name)))
                .unwrap_or_else(|| PathBuf::from(name))
        } else {
            self.service_bin_dir.join(name)
        }
    }
}
