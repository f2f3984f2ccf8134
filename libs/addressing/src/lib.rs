//! Actor Addressing
//!
//! Pure value types naming actors across a cluster of nodes:
//!
//! - [`NodeId`]: identity of one process node (usually `host:port`)
//! - [`Uri`]: hierarchical actor address, optionally qualified with a node
//!
//! # Address Grammar
//!
//! ```text
//! [<node-id>]<path>        path := "" | ("/" <segment>)+
//!
//! "/"               local root (no node)
//! "/user/worker"    local absolute path, resolved against the evaluating node
//! "B"               root of node B
//! "B/worker"        actor "worker" on node B
//! ```
//!
//! A uri without a node is ambiguous until it is evaluated against a specific
//! node: it may mean "local to me" or "local to wherever it came from".

pub mod error;
pub mod node_id;
pub mod uri;

pub use error::UriError;
pub use node_id::NodeId;
pub use uri::Uri;
