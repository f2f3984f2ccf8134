//! Dynamic Actor Messages
//!
//! Every send carries a [`Message`]: a small, pattern-matchable value tree that
//! may embed [`Ref`]s. Refs are the only variant with process-local identity;
//! the envelope codec substitutes them with address markers on the wire.
//!
//! # Protocol Messages
//!
//! The watch protocol uses 2-tuples tagged with a string:
//!
//! ```text
//! ("_watched", watcher)     watcher asks to be told when the target dies
//! ("_unwatched", watcher)   cancel a previous watch
//! ("terminated", target)    target has stopped (or never existed)
//! ("_node_down", nid)       a watched node became unreachable
//! ```

use crate::reference::Ref;
use addressing::NodeId;
use std::collections::BTreeMap;

/// Protocol tag constants
pub mod tags {
    pub const WATCHED: &str = "_watched";
    pub const UNWATCHED: &str = "_unwatched";
    pub const TERMINATED: &str = "terminated";
    pub const NODE_DOWN: &str = "_node_down";
}

/// Dynamic message value
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Message>),
    List(Vec<Message>),
    Map(BTreeMap<String, Message>),
    Ref(Ref),
}

/// Classification of watch-protocol messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol<'a> {
    Watched(&'a Ref),
    Unwatched(&'a Ref),
    Terminated(&'a Ref),
    NodeDown(&'a str),
}

impl Message {
    /// Build a tuple message
    pub fn tuple<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Message>,
    {
        Message::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// `("_watched", watcher)`
    pub fn watched(watcher: Ref) -> Self {
        Self::tagged(tags::WATCHED, Message::Ref(watcher))
    }

    /// `("_unwatched", watcher)`
    pub fn unwatched(watcher: Ref) -> Self {
        Self::tagged(tags::UNWATCHED, Message::Ref(watcher))
    }

    /// `("terminated", target)`
    pub fn terminated(target: Ref) -> Self {
        Self::tagged(tags::TERMINATED, Message::Ref(target))
    }

    /// `("_node_down", nid)`
    pub fn node_down(nid: &NodeId) -> Self {
        Self::tagged(tags::NODE_DOWN, Message::Str(nid.to_string()))
    }

    fn tagged(tag: &str, value: Message) -> Self {
        Message::Tuple(vec![Message::Str(tag.to_string()), value])
    }

    /// Tag of a `(tag, value)` 2-tuple, if this message has that shape
    pub fn tag(&self) -> Option<&str> {
        match self {
            Message::Tuple(items) if items.len() == 2 => items[0].as_str(),
            _ => None,
        }
    }

    /// Recognize one of the watch-protocol messages
    pub fn protocol(&self) -> Option<Protocol<'_>> {
        let Message::Tuple(items) = self else {
            return None;
        };
        let [Message::Str(tag), value] = items.as_slice() else {
            return None;
        };
        match (tag.as_str(), value) {
            (tags::WATCHED, Message::Ref(r)) => Some(Protocol::Watched(r)),
            (tags::UNWATCHED, Message::Ref(r)) => Some(Protocol::Unwatched(r)),
            (tags::TERMINATED, Message::Ref(r)) => Some(Protocol::Terminated(r)),
            (tags::NODE_DOWN, Message::Str(nid)) => Some(Protocol::NodeDown(nid)),
            _ => None,
        }
    }

    /// `_watched`/`_unwatched` requests; these may be lost and never become dead letters
    pub fn is_watch_request(&self) -> bool {
        matches!(self.tag(), Some(tags::WATCHED | tags::UNWATCHED))
    }

    /// Any watch bookkeeping message (`_watched`, `_unwatched`, `terminated`)
    pub fn is_watch_bookkeeping(&self) -> bool {
        matches!(
            self.tag(),
            Some(tags::WATCHED | tags::UNWATCHED | tags::TERMINATED)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Message::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Message::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&Ref> {
        match self {
            Message::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Nesting depth; scalars and refs are depth 1
    pub fn depth(&self) -> usize {
        match self {
            Message::Tuple(items) | Message::List(items) => {
                1 + items.iter().map(Message::depth).max().unwrap_or(0)
            }
            Message::Map(entries) => 1 + entries.values().map(Message::depth).max().unwrap_or(0),
            _ => 1,
        }
    }
}

impl From<()> for Message {
    fn from(_: ()) -> Self {
        Message::Unit
    }
}

impl From<bool> for Message {
    fn from(value: bool) -> Self {
        Message::Bool(value)
    }
}

impl From<i64> for Message {
    fn from(value: i64) -> Self {
        Message::Int(value)
    }
}

impl From<f64> for Message {
    fn from(value: f64) -> Self {
        Message::Float(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Str(value.to_string())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Str(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Bytes(value)
    }
}

impl From<Ref> for Message {
    fn from(value: Ref) -> Self {
        Message::Ref(value)
    }
}

impl From<Vec<Message>> for Message {
    fn from(value: Vec<Message>) -> Self {
        Message::List(value)
    }
}

impl From<BTreeMap<String, Message>> for Message {
    fn from(value: BTreeMap<String, Message>) -> Self {
        Message::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addressing::Uri;

    fn dead(path: &str) -> Ref {
        Ref::dead(Uri::parse(path).unwrap(), None)
    }

    #[test]
    fn test_protocol_classification() {
        let w = dead("/watcher");

        assert_eq!(
            Message::watched(w.clone()).protocol(),
            Some(Protocol::Watched(&w))
        );
        assert_eq!(
            Message::unwatched(w.clone()).protocol(),
            Some(Protocol::Unwatched(&w))
        );
        assert_eq!(
            Message::terminated(w.clone()).protocol(),
            Some(Protocol::Terminated(&w))
        );

        let nid = NodeId::new("B").unwrap();
        assert_eq!(
            Message::node_down(&nid).protocol(),
            Some(Protocol::NodeDown("B"))
        );
    }

    #[test]
    fn test_watch_request_shapes() {
        let w = dead("/watcher");
        assert!(Message::watched(w.clone()).is_watch_request());
        assert!(Message::unwatched(w.clone()).is_watch_request());
        assert!(!Message::terminated(w.clone()).is_watch_request());
        assert!(Message::terminated(w).is_watch_bookkeeping());

        // Tag alone decides; the second element is not inspected
        assert!(Message::tuple(["_watched", "x"]).is_watch_request());
        assert!(Message::tuple(["_watched", "x"]).protocol().is_none());

        assert!(!Message::from("ping").is_watch_request());
        assert!(!Message::tuple(["_watched"]).is_watch_request());
    }

    #[test]
    fn test_depth() {
        assert_eq!(Message::from(1i64).depth(), 1);
        assert_eq!(Message::tuple(["a", "b"]).depth(), 2);

        let nested = Message::List(vec![Message::tuple([Message::List(vec![])])]);
        assert_eq!(nested.depth(), 3);
    }
}
