//! Location-Transparent Actor Remoting
//!
//! Addressing and remoting core of an actor runtime: actors on one node talk
//! to actors on other nodes through the same [`Ref::tell`] they use locally,
//! node failures are reported to watchers, and undeliverable messages are
//! observable as dead-letter [`Event`]s instead of being silently dropped.
//!
//! # Architecture
//!
//! ```text
//!  caller ── Ref::tell ──┬── local ──▶ Cell::receive (non-blocking enqueue)
//!                        │
//!                        └── remote ─▶ Node::send_message
//!                                        │ EnvelopeCodec::encode (refs → markers)
//!                                        ▼
//!                                      Hub::send ─── network ───┐
//!                                                               ▼
//!                     Cell::receive ◀── Node::on_receive ◀── HubCallbacks::on_receive
//!                     or dead letter      │ EnvelopeCodec::decode (markers → Node::lookup)
//!                     or terminated       ▼
//!                                       Guardian::lookup_cell
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use remoting::{InMemoryNetwork, Node};
//! use addressing::NodeId;
//! use std::sync::Arc;
//!
//! # fn main() -> remoting::Result<()> {
//! let network = InMemoryNetwork::new();
//! let a = Node::builder()
//!     .nid(NodeId::new("A")?)
//!     .remoting(Arc::new(network.clone()))
//!     .build()?;
//!
//! let worker = a.lookup_str("B/worker")?;
//! worker.tell("ping");
//! network.run_until_idle();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod events;
pub mod guardian;
pub mod hub;
pub mod message;
pub mod node;
pub mod reference;
pub mod test_utils;

pub use addressing::{NodeId, Uri, UriError};
pub use codec::{Envelope, EnvelopeCodec, WireFormat, WireRef};
pub use error::{RemotingError, Result};
pub use events::{CollectingEventSink, Event, EventSink, NullEventSink, TracingEventSink};
pub use guardian::{ActorContext, Behavior, Cell, Guardian, LocalGuardian};
pub use hub::{
    Hub, HubCallbacks, HubFactory, InMemoryNetwork, NoRemoting, NoRemotingHub, OutboundMessage,
};
pub use message::{tags, Message, Protocol};
pub use node::{default_node, Node, NodeBuilder};
pub use reference::Ref;
