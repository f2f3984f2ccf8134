//! Node: Addressing and Remoting Coordinator
//!
//! A [`Node`] owns the local actor hierarchy (a [`Guardian`]), the [`Hub`]
//! connecting it to other nodes and the [`EventSink`] that receives dead
//! letters. It resolves uris to refs, encodes outbound messages, and
//! dispatches inbound envelopes.
//!
//! # Lifecycle
//!
//! ```text
//! builder ──build()──▶ running ──stop()──▶ stopped (terminal)
//! ```
//!
//! `stop()` takes the guardian and hub out of the shared state under the write
//! lock, then stops the guardian and the hub in that order. Every later local
//! operation fails with [`RemotingError::NodeStopped`]; inbound envelopes and
//! node-down callbacks arriving after `stop()` are dropped.
//!
//! A destination naming this node never goes through the hub: it is resolved
//! against the guardian and delivered to the local cell directly.
//!
//! Nodes are cheap to clone (shared state). Any number can live in one process;
//! [`default_node`] is a lazily built local-only instance for callers that do
//! not need more than one.

use crate::codec::EnvelopeCodec;
use crate::error::{RemotingError, Result};
use crate::events::{self, EventSink, TracingEventSink};
use crate::guardian::{Behavior, Cell, Guardian, LocalGuardian};
use crate::hub::{Hub, HubCallbacks, HubFactory, NoRemotingHub, OutboundMessage};
use crate::message::{Message, Protocol};
use crate::reference::{Ref, Router};
use addressing::{NodeId, Uri};
use node_config::NodeConfig;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

static DEFAULT_NODE: Lazy<Node> = Lazy::new(Node::local);

/// Process-wide local-only node, built on first use
pub fn default_node() -> &'static Node {
    &DEFAULT_NODE
}

/// Handle on a node; clones share state
#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
}

pub(crate) struct NodeShared {
    nid: Option<NodeId>,
    uri: Uri,
    running: RwLock<Option<Running>>,
    events: Arc<dyn EventSink>,
    codec: EnvelopeCodec,
}

#[derive(Clone)]
struct Running {
    guardian: Arc<dyn Guardian>,
    local_guardian: Option<Arc<LocalGuardian>>,
    hub: Arc<dyn Hub>,
}

impl NodeShared {
    fn running(&self) -> Result<Running> {
        self.running
            .read()
            .clone()
            .ok_or_else(|| RemotingError::node_stopped(&self.uri))
    }

    fn send_message(&self, message: Message, destination: &Ref) -> Result<()> {
        let running = self.running()?;
        let Some(nid) = destination.uri().node() else {
            return Err(RemotingError::invalid_uri(
                destination.uri(),
                "destination names no node",
            ));
        };

        if self.nid.as_ref() == Some(nid) {
            self.deliver_locally(&running, message, destination);
            return Ok(());
        }

        match self
            .codec
            .encode(destination.uri(), &message, self.nid.as_ref())
        {
            Ok(bytes) => {
                debug!(
                    node = %self.uri,
                    to = %destination,
                    bytes = bytes.len(),
                    "Sending envelope"
                );
                running.hub.send(
                    nid,
                    OutboundMessage::new(bytes, destination.clone(), message, self.events.clone()),
                );
            }
            Err(e) => {
                warn!(node = %self.uri, to = %destination, error = %e, "Cannot encode message");
                events::dead_letter(self.events.as_ref(), destination, message);
            }
        }
        Ok(())
    }

    /// Missing cells follow the dead ref rules
    fn deliver_locally(&self, running: &Running, message: Message, destination: &Ref) {
        match running.guardian.lookup_cell(&destination.uri().with_node(None)) {
            Some(cell) => {
                debug!(node = %self.uri, to = %destination, "Redirecting send to local cell");
                cell.receive(message);
            }
            None => Ref::dead(destination.uri().clone(), Some(self.events.clone())).tell(message),
        }
    }
}

impl Router for NodeShared {
    fn route(&self, message: Message, recipient: &Ref) {
        if self.running.read().is_none() {
            events::dead_letter(self.events.as_ref(), recipient, message);
            return;
        }
        if let Err(e) = self.send_message(message, recipient) {
            warn!(node = %self.uri, to = %recipient, error = %e, "Remote send failed");
        }
    }
}

impl Node {
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// Local-only node without an id
    pub fn local() -> Self {
        let (parts, _) = Node::builder().into_parts();
        parts.finish(Arc::new(NoRemotingHub))
    }

    /// Build a node from configuration
    ///
    /// `hub_factory` is required when `remoting.enabled` is set and ignored
    /// otherwise.
    pub fn from_config(
        config: &NodeConfig,
        hub_factory: Option<Arc<dyn HubFactory>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RemotingError::configuration(format!("{:#}", e), None))?;

        let mut builder = Node::builder()
            .max_envelope_bytes(config.remoting.max_envelope_bytes)
            .max_message_depth(config.remoting.max_message_depth);
        if let Some(nid) = &config.node.nid {
            builder = builder.nid(NodeId::new(nid.as_str())?);
        }
        if config.remoting.enabled {
            let factory = hub_factory.ok_or_else(|| {
                RemotingError::configuration(
                    "remoting is enabled but no hub factory was supplied",
                    Some("remoting.enabled"),
                )
            })?;
            builder = builder.remoting(factory);
        }
        builder.build()
    }

    pub(crate) fn from_shared(shared: Arc<NodeShared>) -> Self {
        Self { shared }
    }

    pub fn nid(&self) -> Option<&NodeId> {
        self.shared.nid.as_ref()
    }

    /// Root uri of this node (`/` when it has no id)
    pub fn uri(&self) -> &Uri {
        &self.shared.uri
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.shared.events
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.shared.codec
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.running.read().is_none()
    }

    pub fn guardian(&self) -> Result<Arc<dyn Guardian>> {
        Ok(self.shared.running()?.guardian)
    }

    fn is_self(&self, nid: &NodeId) -> bool {
        self.shared.nid.as_ref() == Some(nid)
    }

    /// Resolve `uri` to a ref
    ///
    /// | uri node     | result                                                 |
    /// |--------------|--------------------------------------------------------|
    /// | none         | guardian lookup; `LookupFailed` is returned            |
    /// | this node    | guardian lookup; `LookupFailed` becomes a dead ref     |
    /// | other node   | remote ref (absolute) or `InvalidUri` (relative)       |
    pub fn lookup(&self, uri: &Uri) -> Result<Ref> {
        let running = self.shared.running()?;

        match uri.node() {
            None => running.guardian.lookup_ref(uri),
            Some(nid) if self.is_self(nid) => match running.guardian.lookup_ref(uri) {
                Err(e) if e.is_lookup_failed() => {
                    debug!(node = %self.uri(), uri = %uri, "No local actor, returning dead ref");
                    Ok(Ref::dead(uri.clone(), Some(self.shared.events.clone())))
                }
                other => other,
            },
            Some(_) if uri.is_absolute() => {
                let router: Weak<dyn Router> = Arc::downgrade(&self.shared) as Weak<dyn Router>;
                Ok(Ref::remote(uri.clone(), router))
            }
            Some(_) => Err(RemotingError::invalid_uri(
                uri,
                "relative uri cannot be resolved on a foreign node",
            )),
        }
    }

    /// Parse and resolve an address string
    pub fn lookup_str(&self, text: &str) -> Result<Ref> {
        self.lookup(&Uri::parse(text)?)
    }

    /// Spawn a top-level actor
    pub fn spawn<B: Behavior>(&self, name: Option<&str>, behavior: B) -> Result<Ref> {
        self.shared
            .running()?
            .guardian
            .spawn(None, name, Box::new(behavior))
    }

    /// Spawn an actor below `parent`
    pub fn spawn_under<B: Behavior>(
        &self,
        parent: &Ref,
        name: Option<&str>,
        behavior: B,
    ) -> Result<Ref> {
        self.shared
            .running()?
            .guardian
            .spawn(Some(parent.uri()), name, Box::new(behavior))
    }

    /// Attach a custom cell (requires the built-in guardian)
    pub fn mount(&self, cell: Arc<dyn Cell>) -> Result<Ref> {
        self.local_guardian()?.mount(cell)
    }

    /// Stop a local actor and its children (requires the built-in guardian)
    pub fn stop_actor(&self, target: &Ref) -> Result<()> {
        self.local_guardian()?.stop_actor(target.uri())
    }

    fn local_guardian(&self) -> Result<Arc<LocalGuardian>> {
        self.shared.running()?.local_guardian.ok_or_else(|| {
            RemotingError::configuration("node uses a custom guardian", Some("guardian"))
        })
    }

    /// Encode `message` and hand it to the hub for `destination`'s node
    ///
    /// Encoding problems become a local dead letter, not an error.
    pub fn send_message(&self, message: impl Into<Message>, destination: &Ref) -> Result<()> {
        self.shared.send_message(message.into(), destination)
    }

    /// Ask the hub for one `("_node_down", nid)` to `watcher` when `nid` goes down
    pub fn watch_node(&self, nid: &NodeId, watcher: Ref) -> Result<()> {
        debug!(node = %self.uri(), watched = %nid, watcher = %watcher, "Watching node");
        self.shared.running()?.hub.watch_node(nid, watcher);
        Ok(())
    }

    pub fn unwatch_node(&self, nid: &NodeId, watcher: &Ref) -> Result<()> {
        debug!(node = %self.uri(), watched = %nid, watcher = %watcher, "Unwatching node");
        self.shared.running()?.hub.unwatch_node(nid, watcher);
        Ok(())
    }

    fn remote_node_of<'a>(&self, target: &'a Ref) -> Option<&'a NodeId> {
        target
            .uri()
            .node()
            .filter(|nid| !target.is_local() && !self.is_self(nid))
    }

    /// Death-watch `target` on behalf of `watcher`
    ///
    /// Sends `("_watched", watcher)` to the target and, for remote targets,
    /// also watches the target's node so a crash is reported as `_node_down`.
    pub fn watch(&self, target: &Ref, watcher: &Ref) -> Result<()> {
        let running = self.shared.running()?;
        target.tell(Message::watched(watcher.clone()));
        if let Some(nid) = self.remote_node_of(target) {
            running.hub.watch_node(nid, watcher.clone());
        }
        Ok(())
    }

    /// Undo [`Node::watch`]
    pub fn unwatch(&self, target: &Ref, watcher: &Ref) -> Result<()> {
        let running = self.shared.running()?;
        target.tell(Message::unwatched(watcher.clone()));
        if let Some(nid) = self.remote_node_of(target) {
            running.hub.unwatch_node(nid, watcher);
        }
        Ok(())
    }

    /// Dispatch an inbound envelope from `sender`
    ///
    /// Never fails: corrupt envelopes are logged and dropped, undeliverable
    /// messages become remote dead letters.
    pub fn on_receive(&self, sender: &NodeId, bytes: &[u8]) {
        let Ok(running) = self.shared.running() else {
            debug!(
                node = %self.uri(),
                sender = %sender,
                "Node stopped, dropping inbound envelope"
            );
            return;
        };

        let envelope = match self.shared.codec.decode(bytes, |uri| self.lookup(&uri)) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    node = %self.uri(),
                    sender = %sender,
                    bytes = bytes.len(),
                    error = %e,
                    "Dropping corrupt envelope"
                );
                return;
            }
        };

        if let Some(cell) = running.guardian.lookup_cell(&envelope.path) {
            debug!(
                node = %self.uri(),
                sender = %sender,
                uri = %envelope.path,
                "Delivering envelope"
            );
            cell.receive(envelope.message);
            return;
        }

        let target = Ref::dead(
            envelope.path.with_node(self.shared.nid.clone()),
            Some(self.shared.events.clone()),
        );
        if let Some(Protocol::Watched(watcher)) = envelope.message.protocol() {
            debug!(
                node = %self.uri(),
                uri = %target,
                watcher = %watcher,
                "Watch on missing actor, replying terminated"
            );
            watcher.tell(Message::terminated(target.clone()));
            return;
        }
        events::remote_dead_letter(
            self.shared.events.as_ref(),
            target,
            envelope.message,
            sender.clone(),
        );
    }

    /// Hub callback: `nid` is down; dropped once this node is stopped
    pub fn on_node_down(&self, watcher: &Ref, nid: &NodeId) {
        if self.is_stopped() {
            debug!(node = %self.uri(), down = %nid, "Node stopped, dropping node-down notice");
            return;
        }
        debug!(node = %self.uri(), down = %nid, watcher = %watcher, "Node down");
        watcher.tell(Message::node_down(nid));
    }

    /// Stop the guardian, then the hub; idempotent
    pub fn stop(&self) {
        let Some(running) = self.shared.running.write().take() else {
            return;
        };
        info!(node = %self.uri(), "Stopping node");
        running.guardian.stop();
        running.hub.stop();
        info!(node = %self.uri(), "Node stopped");
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uri", &self.shared.uri)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Builder for [`Node`]
#[derive(Default)]
pub struct NodeBuilder {
    nid: Option<NodeId>,
    remoting: Option<Arc<dyn HubFactory>>,
    guardian: Option<Arc<dyn Guardian>>,
    events: Option<Arc<dyn EventSink>>,
    max_envelope_bytes: Option<u64>,
    max_message_depth: Option<usize>,
}

impl NodeBuilder {
    pub fn nid(mut self, nid: NodeId) -> Self {
        self.nid = Some(nid);
        self
    }

    /// Connect through a hub created by `factory` (requires a nid)
    pub fn remoting(mut self, factory: Arc<dyn HubFactory>) -> Self {
        self.remoting = Some(factory);
        self
    }

    /// Use a custom guardian instead of [`LocalGuardian`]
    pub fn guardian(mut self, guardian: Arc<dyn Guardian>) -> Self {
        self.guardian = Some(guardian);
        self
    }

    /// Event sink for dead letters (default: [`TracingEventSink`])
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn max_envelope_bytes(mut self, bytes: u64) -> Self {
        self.max_envelope_bytes = Some(bytes);
        self
    }

    pub fn max_message_depth(mut self, depth: usize) -> Self {
        self.max_message_depth = Some(depth);
        self
    }

    pub fn build(self) -> Result<Node> {
        let (parts, factory) = self.into_parts();

        let hub: Arc<dyn Hub> = match factory {
            Some(factory) => {
                let nid = parts.shared.nid.clone().ok_or_else(|| {
                    RemotingError::configuration("remoting requires a node id", Some("node.nid"))
                })?;
                factory.create(&nid, HubCallbacks::new(Arc::downgrade(&parts.shared)))?
            }
            None => Arc::new(NoRemotingHub),
        };

        Ok(parts.finish(hub))
    }

    fn into_parts(self) -> (Parts, Option<Arc<dyn HubFactory>>) {
        let defaults = EnvelopeCodec::default();
        let codec = EnvelopeCodec::new(
            self.max_envelope_bytes
                .unwrap_or_else(|| defaults.max_envelope_bytes()),
            self.max_message_depth.unwrap_or_else(|| defaults.max_depth()),
        );
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);
        let uri = Uri::root(self.nid.clone());

        let (guardian, local_guardian) = match self.guardian {
            Some(guardian) => (guardian, None),
            None => {
                let local = LocalGuardian::new(uri.clone(), events.clone());
                (local.clone() as Arc<dyn Guardian>, Some(local))
            }
        };

        let shared = Arc::new(NodeShared {
            nid: self.nid,
            uri,
            running: RwLock::new(None),
            events,
            codec,
        });

        (
            Parts {
                shared,
                guardian,
                local_guardian,
            },
            self.remoting,
        )
    }
}

struct Parts {
    shared: Arc<NodeShared>,
    guardian: Arc<dyn Guardian>,
    local_guardian: Option<Arc<LocalGuardian>>,
}

impl Parts {
    fn finish(self, hub: Arc<dyn Hub>) -> Node {
        *self.shared.running.write() = Some(Running {
            guardian: self.guardian,
            local_guardian: self.local_guardian,
            hub,
        });
        info!(node = %self.shared.uri, "Node started");
        Node {
            shared: self.shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, Event};
    use crate::test_utils::ProbeCell;

    fn nid(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn uri(text: &str) -> Uri {
        Uri::parse(text).unwrap()
    }

    fn node_a() -> (Node, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let node = Node::builder()
            .nid(nid("A"))
            .events(sink.clone())
            .build()
            .unwrap();
        (node, sink)
    }

    #[test]
    fn test_lookup_local_and_self_qualified() {
        let (node, _) = node_a();
        let probe = ProbeCell::new(uri("/worker"));
        node.mount(probe).unwrap();

        let plain = node.lookup_str("/worker").unwrap();
        let qualified = node.lookup_str("A/worker").unwrap();
        assert_eq!(plain, qualified);
        assert!(plain.cell().is_some());
        assert_eq!(plain.uri(), &uri("A/worker"));
    }

    #[test]
    fn test_lookup_failure_branches() {
        let (node, _) = node_a();

        // No node: failure surfaces
        assert!(node.lookup_str("/missing").unwrap_err().is_lookup_failed());

        // Own node: degrades to a dead ref
        let dead = node.lookup_str("A/missing").unwrap();
        assert!(dead.is_local());
        assert!(dead.is_dead());
        assert_eq!(dead.uri(), &uri("A/missing"));

        // Foreign node, absolute: remote ref
        let remote = node.lookup_str("B/worker").unwrap();
        assert!(!remote.is_local());

        // Foreign node, relative: invalid
        let relative = Uri::relative(["worker"]).unwrap().with_node(Some(nid("B")));
        assert!(matches!(
            node.lookup(&relative),
            Err(RemotingError::InvalidUri { .. })
        ));

        assert!(matches!(
            node.lookup_str("B//x"),
            Err(RemotingError::MalformedUri(_))
        ));
    }

    #[test]
    fn test_send_message_requires_node() {
        let (node, _) = node_a();
        let local = Ref::dead(uri("/x"), None);
        assert!(matches!(
            node.send_message("ping", &local),
            Err(RemotingError::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_unencodable_message_is_a_local_dead_letter() {
        let sink = Arc::new(CollectingEventSink::new());
        let node = Node::builder().events(sink.clone()).build().unwrap();
        let remote = node.lookup_str("B/worker").unwrap();
        let anonymous = Ref::local(uri("/me"), ProbeCell::new(uri("/me")));

        node.send_message(Message::from(anonymous.clone()), &remote).unwrap();
        node.send_message(Message::watched(anonymous), &remote).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::DeadLetter { recipient, .. } if recipient == &remote));
    }

    #[test]
    fn test_no_remoting_send_is_dead_letter() {
        let (node, sink) = node_a();
        let remote = node.lookup_str("B/worker").unwrap();

        remote.tell("ping");

        assert_eq!(
            sink.events(),
            vec![Event::DeadLetter {
                recipient: remote,
                message: Message::from("ping")
            }]
        );
    }

    #[test]
    fn test_stop_is_idempotent_and_terminal() {
        let (node, sink) = node_a();
        let remote = node.lookup_str("B/worker").unwrap();

        node.stop();
        node.stop();
        assert!(node.is_stopped());

        assert!(node.lookup_str("/x").unwrap_err().is_node_stopped());
        assert!(node.send_message("ping", &remote).unwrap_err().is_node_stopped());
        assert!(node.watch_node(&nid("B"), remote.clone()).unwrap_err().is_node_stopped());
        assert!(node.guardian().is_err());

        // Refs outliving the node still never fail
        remote.tell("late");
        assert_eq!(sink.dead_letters().len(), 1);
    }

    #[test]
    fn test_remoting_requires_nid() {
        let err = Node::builder()
            .remoting(Arc::new(crate::hub::NoRemoting))
            .build()
            .unwrap_err();
        assert!(matches!(err, RemotingError::Configuration { .. }));
    }

    #[test]
    fn test_from_config() {
        let node = Node::from_config(&NodeConfig::local(Some("A")), None).unwrap();
        assert_eq!(node.nid(), Some(&nid("A")));
        assert_eq!(node.uri().to_string(), "A");

        let err = Node::from_config(&NodeConfig::remote("A"), None).unwrap_err();
        assert!(matches!(err, RemotingError::Configuration { .. }));

        let mut config = NodeConfig::remote("A");
        config.remoting.max_message_depth = 4;
        let node = Node::from_config(&config, Some(Arc::new(crate::hub::NoRemoting))).unwrap();
        assert_eq!(node.codec().max_depth(), 4);
    }

    #[test]
    fn test_default_node_is_shared() {
        let a = default_node();
        let b = default_node();
        assert!(Arc::ptr_eq(&a.shared, &b.shared));
        assert!(a.nid().is_none());
        assert_eq!(a.uri().to_string(), "/");
    }

    #[test]
    fn test_corrupt_inbound_is_dropped() {
        let (node, sink) = node_a();
        node.on_receive(&nid("B"), b"not an envelope");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_self_addressed_send_is_delivered_locally() {
        let (node, sink) = node_a();
        let probe = ProbeCell::new(uri("/worker"));
        node.mount(probe.clone()).unwrap();

        node.send_message("ping", &node.lookup_str("A/worker").unwrap()).unwrap();
        assert_eq!(probe.received(), vec![Message::from("ping")]);
        assert!(sink.is_empty());

        // A remote-flavoured ref to this node is redirected as well
        let router: Weak<dyn Router> = Arc::downgrade(&node.shared) as Weak<dyn Router>;
        Ref::remote(uri("A/worker"), router).tell("again");
        assert_eq!(probe.count(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_self_addressed_send_to_missing_actor_follows_dead_ref_rules() {
        let (node, sink) = node_a();
        let watcher_cell = ProbeCell::new(uri("/watcher"));
        let watcher = node.mount(watcher_cell.clone()).unwrap();
        let gone = Ref::dead(uri("A/gone"), None);

        node.send_message("ping", &gone).unwrap();
        node.send_message(Message::watched(watcher), &gone).unwrap();

        assert_eq!(
            sink.events(),
            vec![Event::DeadLetter {
                recipient: gone.clone(),
                message: Message::from("ping")
            }]
        );
        assert_eq!(watcher_cell.received(), vec![Message::terminated(gone)]);
    }

    #[test]
    fn test_node_down_after_stop_is_dropped() {
        let (node, _) = node_a();
        let probe = ProbeCell::new(uri("/watcher"));
        let watcher = Ref::local(uri("A/watcher"), probe.clone());

        node.on_node_down(&watcher, &nid("B"));
        assert_eq!(probe.received(), vec![Message::node_down(&nid("B"))]);

        node.stop();
        node.on_node_down(&watcher, &nid("C"));
        assert_eq!(probe.count(), 1);
    }
}

