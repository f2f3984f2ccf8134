//! Node identity

use crate::UriError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a process node, e.g. `127.0.0.1:9700`
///
/// Node ids are opaque to the addressing layer; the only constraints are the
/// ones the uri grammar needs: non-empty, no `/`, no whitespace or control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Create a validated node id
    pub fn new(id: impl Into<String>) -> Result<Self, UriError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(id: &str) -> Result<(), UriError> {
    if id.is_empty() {
        return Err(UriError::invalid_node(id, "empty"));
    }
    if id.contains('/') {
        return Err(UriError::invalid_node(id, "contains '/'"));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(UriError::invalid_node(id, "contains whitespace or control characters"));
    }
    Ok(())
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
