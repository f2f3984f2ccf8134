//! Location-Transparent Actor References
//!
//! A [`Ref`] is the handle callers `tell` messages to. It is one of:
//!
//! - **live local**: holds the target [`Cell`]; delivery is a non-blocking enqueue
//! - **dead local**: no cell; delivery only produces observability events
//! - **remote**: bound weakly to the [`Node`](crate::Node) that created it;
//!   delivery goes through that node's hub
//!
//! Refs compare and hash by uri only: a dead ref and a live ref for the same
//! address are interchangeable keys. There is deliberately no serde impl; refs
//! cross the wire only through [`EnvelopeCodec`](crate::EnvelopeCodec).

use crate::events::{self, EventSink};
use crate::guardian::Cell;
use crate::message::{Message, Protocol};
use addressing::Uri;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Outbound path for remote refs, implemented by the owning node
pub(crate) trait Router: Send + Sync {
    fn route(&self, message: Message, recipient: &Ref);
}

/// Actor reference
#[derive(Clone)]
pub struct Ref {
    uri: Uri,
    target: Target,
}

#[derive(Clone)]
enum Target {
    Local {
        cell: Option<Arc<dyn Cell>>,
        events: Option<Arc<dyn EventSink>>,
    },
    Remote {
        router: Weak<dyn Router>,
    },
}

impl Ref {
    /// Live local ref delivering to `cell`
    pub fn local(uri: Uri, cell: Arc<dyn Cell>) -> Self {
        Self {
            uri,
            target: Target::Local {
                cell: Some(cell),
                events: None,
            },
        }
    }

    /// Dead local ref; messages sent to it are reported to `events` when given
    pub fn dead(uri: Uri, events: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            uri,
            target: Target::Local { cell: None, events },
        }
    }

    pub(crate) fn remote(uri: Uri, router: Weak<dyn Router>) -> Self {
        Self {
            uri,
            target: Target::Remote { router },
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// True for refs resolved to this process (live or dead)
    pub fn is_local(&self) -> bool {
        matches!(self.target, Target::Local { .. })
    }

    /// True for local refs with no cell behind them
    pub fn is_dead(&self) -> bool {
        matches!(self.target, Target::Local { cell: None, .. })
    }

    pub fn cell(&self) -> Option<&Arc<dyn Cell>> {
        match &self.target {
            Target::Local { cell, .. } => cell.as_ref(),
            Target::Remote { .. } => None,
        }
    }

    /// Fire-and-forget send
    ///
    /// Never fails from the caller's point of view. Undeliverable messages
    /// surface as dead-letter events or as `terminated` notifications.
    pub fn tell(&self, message: impl Into<Message>) {
        let message = message.into();
        match &self.target {
            Target::Local {
                cell: Some(cell), ..
            } => cell.receive(message),
            Target::Local { cell: None, events } => self.tell_dead(message, events.as_deref()),
            Target::Remote { router } => match router.upgrade() {
                Some(router) => router.route(message, self),
                None => warn!(
                    uri = %self.uri,
                    ?message,
                    "Owning node dropped, discarding message for remote ref"
                ),
            },
        }
    }

    fn tell_dead(&self, message: Message, sink: Option<&dyn EventSink>) {
        match message.protocol() {
            Some(Protocol::Watched(watcher)) => {
                debug!(
                    uri = %self.uri,
                    watcher = %watcher.uri,
                    "Watch on dead ref, replying terminated"
                );
                watcher.tell(Message::terminated(self.clone()));
            }
            Some(Protocol::Unwatched(_)) | Some(Protocol::Terminated(_)) => {}
            _ => match sink {
                Some(sink) => events::dead_letter(sink, self, message),
                None => debug!(uri = %self.uri, ?message, "Message to dead ref dropped"),
            },
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Target::Local { cell: Some(_), .. } => "local",
            Target::Local { cell: None, .. } => "dead",
            Target::Remote { .. } => "remote",
        };
        write!(f, "Ref({}, {})", self.uri, kind)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}
