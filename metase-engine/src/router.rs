//! Source → slave dispatch table.
//!
//! Built once at startup from the configured slave entries. Each entry
//! serves either every registered source (`allow = "*"`) or an explicit
//! comma-separated allow-list. With no entries at all, the local node is
//! registered as the sole slave for every source.
//!
//! Selection is uniform-random among the eligible slaves on every call.

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::source::SourceRegistry;

/// Allow-list value meaning "every registered source".
pub const ALLOW_ALL: &str = "*";

/// One configured slave entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveEntry {
    /// `host:port` of the slave's HTTP listener.
    pub address: String,
    /// `"*"` or a comma-separated list of source names.
    #[serde(default = "default_allow")]
    pub allow: String,
}

fn default_allow() -> String {
    ALLOW_ALL.to_string()
}

impl SlaveEntry {
    /// An entry serving every source.
    pub fn wildcard(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            allow: ALLOW_ALL.to_string(),
        }
    }

    /// Source names this entry allows, trimmed. `None` for the wildcard.
    pub fn allowed(&self) -> Option<Vec<&str>> {
        if self.allow.trim() == ALLOW_ALL {
            return None;
        }
        Some(
            self.allow
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

/// A worker node and the sources it may serve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlaveNode {
    /// `host:port` of the node.
    pub address: String,
    /// Sources the node accepts; `None` for every registered source.
    pub allowed: Option<BTreeSet<String>>,
}

impl SlaveNode {
    /// A node serving every source.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            allowed: None,
        }
    }

    /// Whether the node may serve `source`.
    pub fn serves(&self, source: &str) -> bool {
        self.allowed.as_ref().is_none_or(|set| set.contains(source))
    }
}

/// Immutable map from source name to eligible slaves.
#[derive(Debug, Clone, Default)]
pub struct DispatchRouter {
    table: HashMap<String, Vec<SlaveNode>>,
}

impl DispatchRouter {
    /// Build the table from configured entries.
    ///
    /// When `entries` is empty, `local_address` serves every source.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if an entry has an empty address or
    /// allows a source that is not registered.
    pub fn build(
        entries: &[SlaveEntry],
        registry: &SourceRegistry,
        local_address: &str,
    ) -> Result<Self> {
        let fallback;
        let entries = if entries.is_empty() {
            tracing::info!(address = local_address, "no slaves configured, serving all sources locally");
            fallback = [SlaveEntry::wildcard(local_address)];
            &fallback[..]
        } else {
            entries
        };

        let mut table: HashMap<String, Vec<SlaveNode>> = HashMap::new();
        for entry in entries {
            if entry.address.trim().is_empty() {
                return Err(EngineError::Config("slave address must not be empty".into()));
            }
            let address = entry.address.trim().to_string();
            let names: Vec<String> = match entry.allowed() {
                None => registry.names().map(str::to_string).collect(),
                Some(list) => {
                    for name in &list {
                        if !registry.contains(name) {
                            return Err(EngineError::Config(format!(
                                "slave {address} allows unknown source {name}"
                            )));
                        }
                    }
                    list.into_iter().map(str::to_string).collect()
                }
            };
            let node = SlaveNode {
                address,
                allowed: entry
                    .allowed()
                    .map(|list| list.into_iter().map(str::to_string).collect()),
            };
            for name in names {
                let slaves = table.entry(name).or_default();
                if !slaves.iter().any(|s| s.address == node.address) {
                    slaves.push(node.clone());
                }
            }
        }

        for (name, slaves) in &table {
            tracing::debug!(source = %name, slaves = slaves.len(), "dispatch route");
        }
        Ok(Self { table })
    }

    /// Pick a slave for `source`, or `None` if nothing serves it.
    pub fn resolve(&self, source: &str) -> Option<&SlaveNode> {
        self.table
            .get(source)
            .and_then(|slaves| slaves.choose(&mut rand::thread_rng()))
    }

    /// Every slave eligible for `source`.
    pub fn slaves_for(&self, source: &str) -> &[SlaveNode] {
        self.table.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}
