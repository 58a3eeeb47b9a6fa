use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::fs;
use tracing::warn;

use crate::history::DEFAULT_CAPACITY;

pub const CONFIG_ENV: &str = "SYMBION_POLLER_CONFIG";
pub const MACHINE_DOMAIN_ENV: &str = "SYMBION_MACHINE_DOMAIN";
pub const DEFAULT_CONFIG_PATH: &str = "poller.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("node endpoint must not be empty")]
    EmptyEndpoint,
    #[error("node {0} is configured twice")]
    DuplicateNode(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollerConfig {
    pub listen: String,
    pub info_interval_secs: u64,
    pub stats_interval_secs: u64,
    pub history_capacity: usize,
    /// Domain this poller's machine belongs to; absent when not domain-joined.
    pub machine_domain: Option<String>,
    pub bridge: Option<BridgeConf>,
    pub nodes: Vec<NodeConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NodeConf {
    pub endpoint: String,
    #[serde(default)]
    pub primary_interfaces: Vec<String>,
}

/// External program that runs management queries for us.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BridgeConf {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
}

fn default_bridge_timeout() -> u64 {
    30
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8081".into(),
            info_interval_secs: 300,
            stats_interval_secs: 30,
            history_capacity: DEFAULT_CAPACITY,
            machine_domain: None,
            bridge: None,
            nodes: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn parse(path: &str, txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(txt).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.info_interval_secs == 0 {
            return Err(ConfigError::Zero("info_interval_secs"));
        }
        if self.stats_interval_secs == 0 {
            return Err(ConfigError::Zero("stats_interval_secs"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Zero("history_capacity"));
        }
        if let Some(bridge) = &self.bridge {
            if bridge.timeout_secs == 0 {
                return Err(ConfigError::Zero("bridge.timeout_secs"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.endpoint.trim().is_empty() {
                return Err(ConfigError::EmptyEndpoint);
            }
            if !seen.insert(node.endpoint.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateNode(node.endpoint.clone()));
            }
        }
        Ok(())
    }

    pub fn info_interval(&self) -> Duration {
        Duration::from_secs(self.info_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Machine domain from the environment, else from the file; blank means none.
    /// Resolved once at startup and shared read-only afterwards.
    pub fn resolve_machine_domain(&self, env_value: Option<String>) -> Option<Arc<str>> {
        env_value
            .or_else(|| self.machine_domain.clone())
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .map(Arc::from)
    }
}

/// Load the YAML config named by `SYMBION_POLLER_CONFIG` (default `poller.yaml`).
pub async fn load_config() -> Result<PollerConfig, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> Result<PollerConfig, ConfigError> {
    if !Path::new(path).exists() {
        warn!("No {} found, using default config", path);
        return Ok(PollerConfig::default());
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    PollerConfig::parse(path, &txt)
}
