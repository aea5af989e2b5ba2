//! Engine configuration with sensible defaults.
//!
//! [`EngineConfig`] carries everything the search and fetch sides of a node
//! need: the shared secret, outbound concurrency, timeouts, the slave table
//! and the early-stop policy. It deserialises from the flattened top-level
//! keys of the service's TOML configuration file.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::gather::{EarlyStop, DEFAULT_EARLY_STOP_FLOOR, DEFAULT_EARLY_STOP_THRESHOLD};
use crate::router::SlaveEntry;
use crate::source::SourceRegistry;

/// Default outbound connection limit.
pub const DEFAULT_MAX_CLIENTS: usize = 100;

/// Default per-request and gather timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Early-stop settings as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopConfig {
    /// Whether gathers may complete before their timeout.
    pub enabled: bool,
    /// Completed fraction that arms the early-stop deadline.
    pub threshold: f64,
    /// Floor of the early-stop wait as a fraction of the timeout.
    pub floor_fraction: f64,
}

impl Default for EarlyStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_EARLY_STOP_THRESHOLD,
            floor_fraction: DEFAULT_EARLY_STOP_FLOOR,
        }
    }
}

impl EarlyStopConfig {
    /// The gather policy, or `None` when disabled.
    pub fn policy(&self) -> Option<EarlyStop> {
        self.enabled.then_some(EarlyStop {
            threshold: self.threshold,
            floor_fraction: self.floor_fraction,
        })
    }
}

/// Configuration shared by the orchestrator and the fetch service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `N` in `/api/v{N}/...`.
    pub api_version: u32,
    /// Shared secret used to sign fetch RPCs.
    pub api_secret: String,
    /// Outbound connection limit. The worker pool runs twice this many workers.
    pub max_clients: usize,
    /// Per-request and gather timeout in seconds.
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,
    /// Slave nodes and the sources each may serve.
    pub slaves: Vec<SlaveEntry>,
    /// Default outbound User-Agent. If `None`, one is picked from a built-in
    /// list of realistic browser User-Agents.
    pub user_agent: Option<String>,
    /// Extra default outbound headers, merged over the built-in ones.
    pub default_headers: BTreeMap<String, String>,
    /// How long merged responses are cached, in seconds. 0 disables caching.
    pub cache_ttl_seconds: u64,
    /// Early-stop policy for every gather.
    pub early_stop: EarlyStopConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_version: 1,
            api_secret: String::new(),
            max_clients: DEFAULT_MAX_CLIENTS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            slaves: Vec::new(),
            user_agent: None,
            default_headers: BTreeMap::new(),
            cache_ttl_seconds: 0,
            early_stop: EarlyStopConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Per-request and gather timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates this configuration against the registered sources.
    ///
    /// Checks:
    /// - `max_clients` and `timeout` must be greater than 0
    /// - `early_stop.threshold` must lie in `(0, 1]`
    /// - `early_stop.floor_fraction` must lie in `[0, 1]`
    /// - every slave needs an address, and may only allow registered sources
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] describing the first invalid field.
    pub fn validate(&self, registry: &SourceRegistry) -> Result<()> {
        if self.max_clients == 0 {
            return Err(EngineError::Config("max_clients must be greater than 0".into()));
        }
        if self.timeout_secs == 0 {
            return Err(EngineError::Config("timeout must be greater than 0".into()));
        }
        let es = &self.early_stop;
        if !(es.threshold > 0.0 && es.threshold <= 1.0) {
            return Err(EngineError::Config(
                "early_stop.threshold must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&es.floor_fraction) {
            return Err(EngineError::Config(
                "early_stop.floor_fraction must be in [0, 1]".into(),
            ));
        }
        for slave in &self.slaves {
            if slave.address.trim().is_empty() {
                return Err(EngineError::Config("slave address must not be empty".into()));
            }
            for name in slave.allowed().into_iter().flatten() {
                if !registry.contains(name) {
                    return Err(EngineError::Config(format!(
                        "slave {} allows unknown source {name}",
                        slave.address
                    )));
                }
            }
        }
        Ok(())
    }
}
