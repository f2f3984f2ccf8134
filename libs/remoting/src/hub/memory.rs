//! In-Memory Network
//!
//! Connects any number of nodes in one process without sockets. Sends and
//! liveness probes are queued and delivered only when the test drives the
//! network with [`InMemoryNetwork::run_until_idle`] or
//! [`InMemoryNetwork::deliver_next`], which makes multi-node scenarios
//! deterministic.
//!
//! - a single FIFO queue, so per-channel order is preserved
//! - a send to a node that is unknown (or gone) at delivery time fails and
//!   becomes a dead letter on the sending node
//! - a hub `stop()` is a clean departure, [`InMemoryNetwork::disconnect`] a crash;
//!   both tell every watcher of that node once
//! - watching a node that is not connected yields one node-down notification
//!
//! The network lock is never held while calling back into a node.

use super::{Hub, HubCallbacks, HubFactory, OutboundMessage};
use crate::error::{RemotingError, Result};
use crate::reference::Ref;
use addressing::NodeId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared in-process network; clones share the same state
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<NodeId, Endpoint>,
    in_flight: VecDeque<InFlight>,
}

struct Endpoint {
    callbacks: HubCallbacks,
    /// Watches registered by this node, keyed by watched node
    watches: HashMap<NodeId, Vec<Ref>>,
}

enum InFlight {
    Packet {
        from: NodeId,
        to: NodeId,
        message: OutboundMessage,
    },
    /// `watcher_node` asked about `target` while it was not connected
    Probe { watcher_node: NodeId, target: NodeId },
    /// `target` left the network
    Down { target: NodeId },
}

/// Work extracted under the lock, executed after releasing it
enum Delivery {
    Receive {
        callbacks: HubCallbacks,
        from: NodeId,
        message: OutboundMessage,
    },
    Fail(OutboundMessage),
    NodeDown {
        target: NodeId,
        notices: Vec<(HubCallbacks, Ref)>,
    },
    Nothing,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one queued item; false when the queue was empty
    pub fn deliver_next(&self) -> bool {
        let delivery = {
            let mut state = self.state.lock();
            match state.in_flight.pop_front() {
                Some(item) => state.plan(item),
                None => return false,
            }
        };

        match delivery {
            Delivery::Receive {
                callbacks,
                from,
                message,
            } => callbacks.on_receive(&from, message.bytes()),
            Delivery::Fail(message) => message.send_failed(),
            Delivery::NodeDown { target, notices } => {
                for (callbacks, watcher) in notices {
                    callbacks.on_node_down(&watcher, &target);
                }
            }
            Delivery::Nothing => {}
        }
        true
    }

    /// Deliver until the queue is empty, including anything enqueued meanwhile
    ///
    /// Returns the number of items processed.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_next() {
            delivered += 1;
        }
        delivered
    }

    /// Items waiting for delivery
    pub fn pending(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn is_connected(&self, nid: &NodeId) -> bool {
        self.state.lock().endpoints.contains_key(nid)
    }

    /// Connected node ids, sorted
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.state.lock().endpoints.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Drop `nid` from the network as if it crashed
    pub fn disconnect(&self, nid: &NodeId) -> bool {
        let removed = self.state.lock().depart(nid);
        if removed {
            info!(node = %nid, "Node disconnected from in-memory network");
        }
        removed
    }
}

impl NetworkState {
    fn depart(&mut self, nid: &NodeId) -> bool {
        if self.endpoints.remove(nid).is_none() {
            return false;
        }
        self.in_flight.push_back(InFlight::Down {
            target: nid.clone(),
        });
        true
    }

    fn plan(&mut self, item: InFlight) -> Delivery {
        match item {
            InFlight::Packet { from, to, message } => match self.endpoints.get(&to) {
                Some(endpoint) => Delivery::Receive {
                    callbacks: endpoint.callbacks.clone(),
                    from,
                    message,
                },
                None => Delivery::Fail(message),
            },
            InFlight::Probe {
                watcher_node,
                target,
            } => {
                if self.endpoints.contains_key(&target) {
                    return Delivery::Nothing;
                }
                let notices = self
                    .endpoints
                    .get_mut(&watcher_node)
                    .map(|endpoint| endpoint.take_watchers(&target))
                    .unwrap_or_default();
                Delivery::NodeDown { target, notices }
            }
            InFlight::Down { target } => {
                let notices = self
                    .endpoints
                    .values_mut()
                    .flat_map(|endpoint| endpoint.take_watchers(&target))
                    .collect();
                Delivery::NodeDown { target, notices }
            }
        }
    }
}

impl Endpoint {
    fn take_watchers(&mut self, target: &NodeId) -> Vec<(HubCallbacks, Ref)> {
        self.watches
            .remove(target)
            .unwrap_or_default()
            .into_iter()
            .map(|watcher| (self.callbacks.clone(), watcher))
            .collect()
    }
}

impl HubFactory for InMemoryNetwork {
    fn create(&self, nid: &NodeId, callbacks: HubCallbacks) -> Result<Arc<dyn Hub>> {
        let mut state = self.state.lock();
        if state.endpoints.contains_key(nid) {
            return Err(RemotingError::configuration(
                format!("node {} is already connected", nid),
                Some("node.nid"),
            ));
        }
        state.endpoints.insert(
            nid.clone(),
            Endpoint {
                callbacks,
                watches: HashMap::new(),
            },
        );
        info!(node = %nid, "Node joined in-memory network");

        Ok(Arc::new(MemoryHub {
            nid: nid.clone(),
            network: self.clone(),
        }))
    }
}

/// One node's handle on an [`InMemoryNetwork`]
struct MemoryHub {
    nid: NodeId,
    network: InMemoryNetwork,
}

impl Hub for MemoryHub {
    fn send(&self, nid: &NodeId, message: OutboundMessage) {
        debug!(from = %self.nid, to = %nid, bytes = message.bytes().len(), "Queueing envelope");
        self.network.state.lock().in_flight.push_back(InFlight::Packet {
            from: self.nid.clone(),
            to: nid.clone(),
            message,
        });
    }

    fn watch_node(&self, nid: &NodeId, watcher: Ref) {
        let mut state = self.network.state.lock();
        let connected = state.endpoints.contains_key(nid);
        let Some(endpoint) = state.endpoints.get_mut(&self.nid) else {
            return;
        };
        endpoint
            .watches
            .entry(nid.clone())
            .or_default()
            .push(watcher);
        if !connected {
            state.in_flight.push_back(InFlight::Probe {
                watcher_node: self.nid.clone(),
                target: nid.clone(),
            });
        }
    }

    fn unwatch_node(&self, nid: &NodeId, watcher: &Ref) {
        let mut state = self.network.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(&self.nid) {
            if let Some(watchers) = endpoint.watches.get_mut(nid) {
                if let Some(idx) = watchers.iter().position(|w| w == watcher) {
                    watchers.remove(idx);
                }
                if watchers.is_empty() {
                    endpoint.watches.remove(nid);
                }
            }
        }
    }

    fn stop(&self) {
        if self.network.state.lock().depart(&self.nid) {
            info!(node = %self.nid, "Node left in-memory network");
        }
    }
}
