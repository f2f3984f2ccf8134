//! Remoting Error Types
//!
//! Errors surfaced synchronously to the direct caller. Delivery problems are
//! never errors: they become dead-letter events (see [`crate::events`]).

use addressing::UriError;
use thiserror::Error;

/// Main remoting error type
#[derive(Error, Debug)]
pub enum RemotingError {
    /// Address text could not be parsed
    #[error("Malformed uri: {0}")]
    MalformedUri(#[from] UriError),

    /// Address is well formed but unusable in this context
    #[error("Invalid uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// No actor lives at a local path
    #[error("Lookup failed: no actor at {uri}")]
    LookupFailed { uri: String },

    /// Inbound envelope could not be decoded or rehydrated
    #[error("Corrupt envelope: {message}")]
    CorruptEnvelope {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound message could not be encoded
    #[error("Encode error: {message}")]
    Encode {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation on a node after `stop()`
    #[error("Node {node} is stopped")]
    NodeStopped { node: String },

    /// Actor could not be created
    #[error("Spawn failed: {message}")]
    Spawn { message: String },

    /// Node or hub construction rejected its configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Result type alias for remoting operations
pub type Result<T> = std::result::Result<T, RemotingError>;

impl RemotingError {
    /// Create an invalid uri error
    pub fn invalid_uri(uri: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a lookup failure
    pub fn lookup_failed(uri: impl ToString) -> Self {
        Self::LookupFailed {
            uri: uri.to_string(),
        }
    }

    /// Create a corrupt envelope error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptEnvelope {
            message: message.into(),
            source: None,
        }
    }

    /// Create a corrupt envelope error with source
    pub fn corrupt_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CorruptEnvelope {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
            source: None,
        }
    }

    /// Create an encode error with source
    pub fn encode_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Encode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a node stopped error
    pub fn node_stopped(node: impl ToString) -> Self {
        Self::NodeStopped {
            node: node.to_string(),
        }
    }

    /// Create a spawn error
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// True for [`RemotingError::LookupFailed`]
    pub fn is_lookup_failed(&self) -> bool {
        matches!(self, Self::LookupFailed { .. })
    }

    /// True for [`RemotingError::NodeStopped`]
    pub fn is_node_stopped(&self) -> bool {
        matches!(self, Self::NodeStopped { .. })
    }
}
