//! Dead-Letter Events
//!
//! Undeliverable messages are never errors for the sender. The node decides
//! *when* a message is undeliverable and reports it through an [`EventSink`];
//! what happens next (logging, capture, forwarding) belongs to the sink.

use crate::message::Message;
use crate::reference::Ref;
use addressing::NodeId;
use parking_lot::Mutex;
use tracing::warn;

/// Observability event emitted by a node
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Message could not leave this node (encode failure, unreachable hub, stopped node)
    DeadLetter { recipient: Ref, message: Message },

    /// Message arrived from `sender` but no actor lives at `recipient`
    RemoteDeadLetter {
        recipient: Ref,
        message: Message,
        sender: NodeId,
    },
}

impl Event {
    pub fn recipient(&self) -> &Ref {
        match self {
            Event::DeadLetter { recipient, .. } | Event::RemoteDeadLetter { recipient, .. } => {
                recipient
            }
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            Event::DeadLetter { message, .. } | Event::RemoteDeadLetter { message, .. } => message,
        }
    }
}

/// Receiver of node events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink: one `warn!` per event
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::DeadLetter { recipient, message } => {
                warn!(recipient = %recipient, ?message, "Dead letter");
            }
            Event::RemoteDeadLetter {
                recipient,
                message,
                sender,
            } => {
                warn!(recipient = %recipient, ?message, sender = %sender, "Remote dead letter");
            }
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that keeps every event, for tests and diagnostics
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of collected events
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Drain collected events
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn dead_letters(&self) -> Vec<Event> {
        self.filtered(|event| matches!(event, Event::DeadLetter { .. }))
    }

    pub fn remote_dead_letters(&self) -> Vec<Event> {
        self.filtered(|event| matches!(event, Event::RemoteDeadLetter { .. }))
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    fn filtered(&self, keep: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|event| keep(event))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Report a local dead letter unless `message` is a watch request
pub(crate) fn dead_letter(sink: &dyn EventSink, recipient: &Ref, message: Message) {
    if message.is_watch_request() {
        return;
    }
    sink.emit(Event::DeadLetter {
        recipient: recipient.clone(),
        message,
    });
}

/// Report a remote dead letter unless `message` is watch bookkeeping
pub(crate) fn remote_dead_letter(
    sink: &dyn EventSink,
    recipient: Ref,
    message: Message,
    sender: NodeId,
) {
    if message.is_watch_bookkeeping() {
        return;
    }
    sink.emit(Event::RemoteDeadLetter {
        recipient,
        message,
        sender,
    });
}
