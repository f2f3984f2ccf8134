//! Hub for nodes without remoting
//!
//! Every remote destination is unreachable: sends become dead letters and
//! watch registrations are ignored.

use super::{Hub, HubCallbacks, HubFactory, OutboundMessage};
use crate::error::Result;
use crate::reference::Ref;
use addressing::NodeId;
use std::sync::Arc;
use tracing::debug;

/// Hub with no network behind it
#[derive(Debug, Default)]
pub struct NoRemotingHub;

impl Hub for NoRemotingHub {
    fn send(&self, nid: &NodeId, message: OutboundMessage) {
        debug!(node = %nid, "Remoting disabled, send fails");
        message.send_failed();
    }

    fn watch_node(&self, _nid: &NodeId, _watcher: Ref) {}

    fn unwatch_node(&self, _nid: &NodeId, _watcher: &Ref) {}

    fn stop(&self) {}
}

/// Factory for [`NoRemotingHub`]
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemoting;

impl HubFactory for NoRemoting {
    fn create(&self, _nid: &NodeId, _callbacks: HubCallbacks) -> Result<Arc<dyn Hub>> {
        Ok(Arc::new(NoRemotingHub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, Event};
    use crate::message::Message;
    use bytes::Bytes;

    #[test]
    fn test_every_send_is_a_dead_letter() {
        let sink = Arc::new(CollectingEventSink::new());
        let recipient = Ref::dead(addressing::Uri::parse("B/x").unwrap(), None);
        let hub = NoRemotingHub;
        let nid = NodeId::new("B").unwrap();

        hub.send(
            &nid,
            OutboundMessage::new(
                Bytes::new(),
                recipient.clone(),
                Message::from("ping"),
                sink.clone(),
            ),
        );
        hub.send(
            &nid,
            OutboundMessage::new(
                Bytes::new(),
                recipient.clone(),
                Message::watched(recipient.clone()),
                sink.clone(),
            ),
        );

        assert_eq!(
            sink.events(),
            vec![Event::DeadLetter {
                recipient,
                message: Message::from("ping")
            }]
        );
    }
}
