//! Node Configuration Module
//!
//! Provides configuration loading for remoting nodes.
//! Supports loading from TOML files with environment variable overrides.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main node configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity and logging of this node
    pub node: NodeSettings,

    /// Cross-node messaging settings
    pub remoting: RemotingSettings,
}

/// Node identity settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NodeSettings {
    /// Node id (`host:port`); required when remoting is enabled
    pub nid: Option<String>,

    /// Tracing filter directive used by binaries
    pub log_level: String,
}

/// Remoting settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RemotingSettings {
    /// Attach a hub so the node can talk to other nodes
    pub enabled: bool,

    /// Largest accepted wire envelope in bytes
    pub max_envelope_bytes: u64,

    /// Deepest accepted message nesting
    pub max_message_depth: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            nid: None,
            log_level: defaults::logging::LOG_LEVEL.to_string(),
        }
    }
}

impl Default for RemotingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_envelope_bytes: defaults::remoting::MAX_ENVELOPE_BYTES,
            max_message_depth: defaults::remoting::MAX_MESSAGE_DEPTH,
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional TOML file with environment overrides
    ///
    /// Environment variables use the `REMOTING_` prefix and `__` as the
    /// section separator, e.g. `REMOTING_NODE__NID=10.0.0.1:9700`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading node config: {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(?config, "Node configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment layering)
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: NodeConfig =
            toml::from_str(text).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.remoting.enabled && self.node.nid.is_none() {
            bail!("remoting.enabled requires node.nid to be set");
        }
        if self.remoting.max_envelope_bytes == 0 {
            bail!("remoting.max_envelope_bytes must be positive");
        }
        if self.remoting.max_message_depth == 0 {
            bail!("remoting.max_message_depth must be positive");
        }
        Ok(())
    }

    /// Local-only configuration for node `nid`
    pub fn local(nid: Option<&str>) -> Self {
        Self {
            node: NodeSettings {
                nid: nid.map(str::to_string),
                ..NodeSettings::default()
            },
            remoting: RemotingSettings::default(),
        }
    }

    /// Remoting-enabled configuration for node `nid`
    pub fn remote(nid: &str) -> Self {
        let mut config = Self::local(Some(nid));
        config.remoting.enabled = true;
        config
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    NodeConfig::load(path)
}
