//! Collector configuration loaded from a TOML file
//!
//! ```toml
//! [listen]
//! address = "0.0.0.0"
//! port = 30002
//!
//! [export]
//! interval_secs = 10
//! http = "127.0.0.1:3000"
//!
//! [[view]]
//! name = "api"
//! script = "/index.php"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::receiver::Endpoint;
use crate::stats::{RegistryBuilder, RegistryError, ViewFilter, ViewSpec};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("listen port cannot be 0")]
    InvalidPort,

    #[error("export interval must be at least one second")]
    InvalidInterval,

    #[error("invalid http address '{0}'")]
    InvalidHttpAddr(String),

    #[error(transparent)]
    View(#[from] RegistryError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default, rename = "view")]
    pub views: Vec<ViewConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenConfig {
    #[serde(default = "defaults::address")]
    pub address: String,

    #[serde(default = "defaults::port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Seconds between harvest rounds
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,

    /// Bind address of the read-only HTTP API; disabled when absent
    #[serde(default)]
    pub http: Option<String>,
}

/// One `[[view]]` table. Only `host`, `server` and `script` filters exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
}

mod defaults {
    pub fn address() -> String {
        "0.0.0.0".to_string()
    }

    pub fn port() -> u16 {
        30002
    }

    pub fn interval_secs() -> u64 {
        10
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: defaults::address(),
            port: defaults::port(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval_secs(),
            http: None,
        }
    }
}

impl From<&ViewConfig> for ViewSpec {
    fn from(view: &ViewConfig) -> Self {
        ViewSpec::new(
            view.name.clone(),
            ViewFilter {
                host: view.host.clone(),
                server: view.server.clone(),
                script: view.script.clone(),
            },
        )
    }
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.export.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        self.http_addr()?;
        self.registry_builder()?;
        Ok(())
    }

    /// Fresh configuration phase holding `"total"` plus every configured
    /// view. Any rejected view fails the whole build.
    pub fn registry_builder(&self) -> Result<RegistryBuilder, ConfigError> {
        let mut builder = RegistryBuilder::new();
        for view in &self.views {
            builder.add_view(view.into())?;
        }
        Ok(builder)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.listen.address.clone(), self.listen.port)
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export.interval_secs)
    }

    pub fn http_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.export
            .http
            .as_deref()
            .map(|s| s.parse().map_err(|_| ConfigError::InvalidHttpAddr(s.to_string())))
            .transpose()
    }
}
