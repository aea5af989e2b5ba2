//! Service configuration.
//!
//! [`MetaseConfig`] is loaded from a TOML file. Every key is optional; the
//! engine keys (`api_secret`, `max_clients`, `timeout`, `slaves`, ...) sit at
//! the top level next to the server keys.
//!
//! ```toml
//! port = 9281
//! api_secret = "change me"
//! timeout = 10
//!
//! [[slaves]]
//! address = "10.0.0.2:9281"
//! allow = "Baidu,Sogou"
//!
//! [early_stop]
//! threshold = 0.8
//! ```

use std::path::{Path, PathBuf};

use metase_engine::{EngineConfig, SourceRegistry};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9281;

/// Full service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaseConfig {
    /// Bind address.
    pub host: String,
    /// Bind port. 0 picks an ephemeral port.
    pub port: u16,
    /// Serve only the fetch endpoint; this node is a pure slave.
    pub only_slave: bool,
    /// Log filter used when `RUST_LOG` is unset, e.g. `info` or `debug`.
    pub log_level: String,
    /// Write logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Engine settings, flattened into the top-level table.
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Default for MetaseConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            only_slave: false,
            log_level: "info".to_string(),
            log_file: None,
            engine: EngineConfig::default(),
        }
    }
}

impl MetaseConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the text is not valid configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate against the registered sources.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an empty host and
    /// [`ServerError::Engine`] for invalid engine settings.
    pub fn validate(&self, registry: &SourceRegistry) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ServerError::Config("host must not be empty".into()));
        }
        self.engine.validate(registry)?;
        Ok(())
    }
}
