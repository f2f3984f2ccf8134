//! Local Actor Hierarchy Contracts
//!
//! The node consumes a [`Guardian`] to resolve local paths and create actors,
//! and hands messages to [`Cell`]s. [`LocalGuardian`] is the tokio-backed
//! implementation shipped with this crate.

mod local;

pub use local::LocalGuardian;

use crate::error::Result;
use crate::message::Message;
use crate::reference::Ref;
use addressing::Uri;
use async_trait::async_trait;
use std::sync::Arc;

/// Delivery endpoint of one actor
pub trait Cell: Send + Sync {
    fn uri(&self) -> &Uri;

    /// Enqueue `message`; must not block on processing
    fn receive(&self, message: Message);
}

/// Root of the local actor hierarchy
pub trait Guardian: Send + Sync {
    /// Resolve a local path (uri node ignored) to a live ref
    ///
    /// Fails with `LookupFailed` when no actor lives there.
    fn lookup_ref(&self, uri: &Uri) -> Result<Ref>;

    /// Resolve a local path to its cell, if any
    fn lookup_cell(&self, uri: &Uri) -> Option<Arc<dyn Cell>>;

    /// Create an actor under `parent` (the root when `None`)
    fn spawn(
        &self,
        parent: Option<&Uri>,
        name: Option<&str>,
        behavior: Box<dyn Behavior>,
    ) -> Result<Ref>;

    /// Stop every actor; later spawns fail
    fn stop(&self);
}

/// Message handler run by an actor
#[async_trait]
pub trait Behavior: Send + 'static {
    /// Handle one message; an error stops the actor
    async fn receive(&mut self, ctx: &ActorContext, message: Message) -> anyhow::Result<()>;

    async fn on_stop(&mut self, _ctx: &ActorContext) {}
}

/// Per-actor context handed to [`Behavior::receive`]
#[derive(Debug, Clone)]
pub struct ActorContext {
    myself: Ref,
}

impl ActorContext {
    pub(crate) fn new(myself: Ref) -> Self {
        Self { myself }
    }

    /// This actor's own ref
    pub fn myself(&self) -> &Ref {
        &self.myself
    }

    pub fn uri(&self) -> &Uri {
        self.myself.uri()
    }
}
