//! Shared helpers for multi-node tests

#![allow(dead_code)]

use remoting::test_utils::ProbeCell;
use remoting::{CollectingEventSink, InMemoryNetwork, Message, Node, NodeId, Ref, Uri};
use std::sync::Arc;
use std::time::Duration;

pub fn nid(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

pub fn uri(text: &str) -> Uri {
    Uri::parse(text).unwrap()
}

/// Node `id` joined to `network`, recording its events
pub fn connect(network: &InMemoryNetwork, id: &str) -> (Node, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let node = Node::builder()
        .nid(nid(id))
        .remoting(Arc::new(network.clone()))
        .events(sink.clone())
        .build()
        .unwrap();
    (node, sink)
}

/// Probe cell mounted at `path` on `node`
pub fn probe(node: &Node, path: &str) -> (Arc<ProbeCell>, Ref) {
    let cell = ProbeCell::new(uri(path));
    let r = node.mount(cell.clone()).unwrap();
    (cell, r)
}

/// Drive the network while spawned actors run, until `done` holds
pub async fn pump_until(network: &InMemoryNetwork, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        network.run_until_idle();
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

pub fn ping() -> Message {
    Message::from("ping")
}
