//! Hub Contract
//!
//! A hub moves encoded envelopes between nodes and watches node liveness.
//! Everything is best effort and asynchronous: a failed send is reported by
//! calling [`OutboundMessage::send_failed`], never by returning an error.
//!
//! The node hands each hub a [`HubCallbacks`] at construction; the hub calls
//! back into the node for inbound bytes and node-down notifications. The
//! callbacks hold the node weakly, so a hub never keeps its node alive.

mod memory;
mod no_remoting;

pub use memory::InMemoryNetwork;
pub use no_remoting::{NoRemoting, NoRemotingHub};

use crate::error::Result;
use crate::events::{self, EventSink};
use crate::message::Message;
use crate::node::{Node, NodeShared};
use crate::reference::Ref;
use addressing::NodeId;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Transport and failure detector shared by one node
pub trait Hub: Send + Sync {
    /// Hand an encoded envelope to the transport for `nid`
    fn send(&self, nid: &NodeId, message: OutboundMessage);

    /// Register `watcher` for one node-down notification about `nid`
    fn watch_node(&self, nid: &NodeId, watcher: Ref);

    /// Cancel a previous [`Hub::watch_node`] registration
    fn unwatch_node(&self, nid: &NodeId, watcher: &Ref);

    /// Leave the network; idempotent
    fn stop(&self);
}

/// Creates the hub for a node
pub trait HubFactory: Send + Sync {
    fn create(&self, nid: &NodeId, callbacks: HubCallbacks) -> Result<Arc<dyn Hub>>;
}

/// Encoded envelope plus what is needed to report its loss
pub struct OutboundMessage {
    bytes: Bytes,
    recipient: Ref,
    message: Message,
    events: Arc<dyn EventSink>,
}

impl OutboundMessage {
    pub(crate) fn new(
        bytes: Bytes,
        recipient: Ref,
        message: Message,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            bytes,
            recipient,
            message,
            events,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn recipient(&self) -> &Ref {
        &self.recipient
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Report that the envelope could not be delivered
    pub fn send_failed(self) {
        debug!(recipient = %self.recipient, "Outbound envelope undeliverable");
        events::dead_letter(self.events.as_ref(), &self.recipient, self.message);
    }
}

impl fmt::Debug for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundMessage")
            .field("recipient", &self.recipient)
            .field("message", &self.message)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Entry points a hub uses to call back into its node
#[derive(Clone)]
pub struct HubCallbacks {
    node: Weak<NodeShared>,
}

impl HubCallbacks {
    pub(crate) fn new(node: Weak<NodeShared>) -> Self {
        Self { node }
    }

    /// Inbound envelope from `sender`
    pub fn on_receive(&self, sender: &NodeId, bytes: &[u8]) {
        match self.node.upgrade() {
            Some(shared) => Node::from_shared(shared).on_receive(sender, bytes),
            None => debug!(sender = %sender, "Node dropped, discarding inbound envelope"),
        }
    }

    /// `nid` is down; tell `watcher`
    pub fn on_node_down(&self, watcher: &Ref, nid: &NodeId) {
        match self.node.upgrade() {
            Some(shared) => Node::from_shared(shared).on_node_down(watcher, nid),
            None => debug!(down = %nid, watcher = %watcher, "Node dropped, discarding node-down"),
        }
    }
}

impl fmt::Debug for HubCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubCallbacks")
            .field("attached", &(self.node.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ProbeCell;
    use addressing::Uri;

    #[test]
    fn test_callbacks_for_dropped_node_are_discarded() {
        let callbacks = HubCallbacks::new(Weak::new());
        let probe = ProbeCell::new(Uri::parse("/watcher").unwrap());
        let watcher = Ref::local(Uri::parse("A/watcher").unwrap(), probe.clone());
        let b = NodeId::new("B").unwrap();

        callbacks.on_node_down(&watcher, &b);
        callbacks.on_receive(&b, b"ACTR\x01");

        assert_eq!(probe.count(), 0);
    }
}
