//! # Node Configuration
//!
//! Configuration loading and defaults for remoting nodes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use node_config::{load_config, NodeConfig};
//!
//! // Layered: file, then REMOTING_* environment variables
//! let config = load_config(Some(std::path::Path::new("config/node.toml"))).unwrap();
//! assert!(config.remoting.max_envelope_bytes > 0);
//!
//! // Or inline
//! let config = NodeConfig::from_toml_str("[node]\nnid = \"A\"").unwrap();
//! ```

pub mod defaults;
pub mod node_config;

// Re-export commonly used types
pub use node_config::{load_config, NodeConfig, NodeSettings, RemotingSettings};
