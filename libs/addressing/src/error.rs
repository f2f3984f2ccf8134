//! Address parsing errors

use thiserror::Error;

/// Failure to parse or build a [`crate::Uri`] or [`crate::NodeId`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The input was empty
    #[error("Malformed uri: empty input")]
    Empty,

    /// The node id part is not acceptable
    #[error("Malformed uri: invalid node id {node:?}: {reason}")]
    InvalidNode { node: String, reason: &'static str },

    /// A path segment is not acceptable
    #[error("Malformed uri {input:?}: invalid segment {segment:?}: {reason}")]
    InvalidSegment {
        input: String,
        segment: String,
        reason: &'static str,
    },
}

impl UriError {
    pub(crate) fn invalid_node(node: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidNode {
            node: node.into(),
            reason,
        }
    }

    pub(crate) fn invalid_segment(
        input: impl Into<String>,
        segment: impl Into<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidSegment {
            input: input.into(),
            segment: segment.into(),
            reason,
        }
    }
}
