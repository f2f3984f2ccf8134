//! Hierarchical Actor Uri
//!
//! Parses and renders actor addresses of the form `[<node-id>]<path>`.
//! [`Uri::parse`] and the [`fmt::Display`] impl are exact inverses for every
//! value `parse` can produce:
//!
//! | text            | node  | segments             |
//! |-----------------|-------|----------------------|
//! | `/`             | -     | `[]`                 |
//! | `/user/worker`  | -     | `["user", "worker"]` |
//! | `B`             | `B`   | `[]`                 |
//! | `B/worker`      | `B`   | `["worker"]`         |
//!
//! Relative uris have no textual form and are only built with
//! [`Uri::relative`]; nodes refuse to resolve them against a foreign node.

use crate::{NodeId, UriError};
use std::fmt;
use std::str::FromStr;

/// Immutable actor address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    node: Option<NodeId>,
    segments: Vec<String>,
    absolute: bool,
}

impl Uri {
    /// Parse an address string
    pub fn parse(text: &str) -> Result<Self, UriError> {
        if text.is_empty() {
            return Err(UriError::Empty);
        }

        let (node, path) = match text.find('/') {
            Some(0) => (None, text),
            Some(idx) => (Some(NodeId::new(&text[..idx])?), &text[idx..]),
            None => (Some(NodeId::new(text)?), ""),
        };

        let segments = if path.is_empty() || (path == "/" && node.is_none()) {
            Vec::new()
        } else {
            path[1..]
                .split('/')
                .map(|segment| validate_segment(text, segment).map(|_| segment.to_string()))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            node,
            segments,
            absolute: true,
        })
    }

    /// Root of `node`'s hierarchy, or the local root when `node` is `None`
    pub fn root(node: Option<NodeId>) -> Self {
        Self {
            node,
            segments: Vec::new(),
            absolute: true,
        }
    }

    /// Absolute uri from already split segments
    pub fn absolute<I, S>(node: Option<NodeId>, segments: I) -> Result<Self, UriError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = collect_segments(segments)?;
        Ok(Self {
            node,
            segments,
            absolute: true,
        })
    }

    /// Relative uri (no node, not anchored at a root)
    pub fn relative<I, S>(segments: I) -> Result<Self, UriError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = collect_segments(segments)?;
        Ok(Self {
            node: None,
            segments,
            absolute: false,
        })
    }

    /// Owning node, if qualified
    pub fn node(&self) -> Option<&NodeId> {
        self.node.as_ref()
    }

    /// Path segments from the root (or from the base, when relative)
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last path segment
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True for the root of a hierarchy
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// True when the path is anchored at a root
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Parent address; `None` for roots and single-segment relative uris
    pub fn parent(&self) -> Option<Uri> {
        if self.segments.is_empty() || (!self.absolute && self.segments.len() == 1) {
            return None;
        }
        Some(Self {
            node: self.node.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            absolute: self.absolute,
        })
    }

    /// Address of a child named `name`
    pub fn child(&self, name: &str) -> Result<Uri, UriError> {
        validate_segment(name, name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            node: self.node.clone(),
            segments,
            absolute: self.absolute,
        })
    }

    /// Same path, qualified with (or stripped of) a node
    pub fn with_node(&self, node: Option<NodeId>) -> Uri {
        Self {
            node,
            segments: self.segments.clone(),
            absolute: self.absolute,
        }
    }

    /// Path part only, as carried in wire envelopes (`/` for the root)
    pub fn local_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Render to the address grammar; alias of `to_string()`
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn collect_segments<I, S>(segments: I) -> Result<Vec<String>, UriError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments
        .into_iter()
        .map(|segment| {
            let segment = segment.into();
            validate_segment(&segment, &segment)?;
            Ok(segment)
        })
        .collect()
}

fn validate_segment(input: &str, segment: &str) -> Result<(), UriError> {
    if segment.is_empty() {
        return Err(UriError::invalid_segment(input, segment, "empty segment"));
    }
    if segment.contains('/') {
        return Err(UriError::invalid_segment(input, segment, "contains '/'"));
    }
    if segment.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(UriError::invalid_segment(
            input,
            segment,
            "contains whitespace or control characters",
        ));
    }
    Ok(())
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.absolute {
            // Diagnostic form only, relative uris cannot be parsed back
            f.write_str(&self.segments.join("/"))?;
            if let Some(node) = &self.node {
                write!(f, "@{}", node)?;
            }
            return Ok(());
        }

        match &self.node {
            Some(node) => write!(f, "{}", node)?,
            None if self.segments.is_empty() => f.write_str("/")?,
            None => {}
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
