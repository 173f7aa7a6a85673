//! Application configuration.
//!
//! Layers, later ones winning: built-in defaults, then
//! `<config_dir>/yeti-session/config.toml`, then `YETI_`-prefixed
//! environment variables with `__` between nesting levels
//! (`YETI_PROFILE__LANGUAGE=eng`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::error::{Error, Result};
use crate::session::{EndpointOverrides, PlatformProfile};

/// Directory name under the platform config and data directories.
pub const APP_DIR: &str = "yeti-session";

const ENV_PREFIX: &str = "YETI_";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: PlatformProfile,
    pub endpoints: EndpointOverrides,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
}

/// Where persisted session state lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Settings file for the `file` backend.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    /// OS keychain; needs the `keyring` feature.
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter for the log file when `RUST_LOG` is unset.
    pub level: String,
    /// Filter for stderr when `RUST_LOG` is unset.
    pub stderr_level: String,
    /// Write JSON logs to a daily rolling file.
    pub file: bool,
    /// Override the log directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stderr_level: "warn".to_string(),
            file: true,
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Configured directory or `<data_dir>/yeti-session/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join(APP_DIR).join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load from the default config file and the environment.
    ///
    /// Without a config directory only defaults and the environment apply.
    pub fn load() -> Result<Self> {
        Self::extract(Self::layered(Self::config_path().as_deref()))
    }

    /// Load from `path` and the environment. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::extract(Self::layered(Some(path.as_ref())))
    }

    fn layered(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = file {
            debug!(path = %path.display(), "loading config");
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Self::env())
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `<config_dir>/yeti-session/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        self.profile.partner_id()?;
        self.endpoints.validate()?;
        if self.http.timeout_secs == 0 {
            return Err(Error::config("http.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}
