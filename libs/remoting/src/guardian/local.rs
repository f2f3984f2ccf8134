//! Tokio-backed Guardian
//!
//! Each spawned actor gets an unbounded mailbox and its own task. The task
//! handles the `_watched`/`_unwatched` protocol itself, so behaviors never see
//! those messages, and tells every watcher `("terminated", dead_ref)` on exit.
//! A behavior error stops the actor; there is no restart policy.
//!
//! # Lock Ordering
//!
//! Only `entries` is locked here and it is never held across a `tell`,
//! so watcher notifications cannot re-enter the guardian under the lock.

use super::{ActorContext, Behavior, Cell, Guardian};
use crate::error::{RemotingError, Result};
use crate::events::{self, EventSink};
use crate::message::{Message, Protocol};
use crate::reference::Ref;
use addressing::Uri;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Path = Vec<String>;

enum Entry {
    Actor(Arc<MailboxCell>),
    Mounted(Arc<dyn Cell>),
}

impl Entry {
    fn cell(&self) -> Arc<dyn Cell> {
        match self {
            Entry::Actor(cell) => cell.clone() as Arc<dyn Cell>,
            Entry::Mounted(cell) => cell.clone(),
        }
    }

    fn stop(&self) {
        if let Entry::Actor(cell) = self {
            cell.signal_stop();
        }
    }
}

/// Registry of local cells keyed by path
pub struct LocalGuardian {
    root: Uri,
    events: Arc<dyn EventSink>,
    entries: RwLock<HashMap<Path, Entry>>,
    stopped: AtomicBool,
    myself: Weak<LocalGuardian>,
}

impl LocalGuardian {
    /// Guardian for the hierarchy rooted at `root` (a node root or `/`)
    pub fn new(root: Uri, events: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new_cyclic(|myself| Self {
            root,
            events,
            entries: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            myself: myself.clone(),
        })
    }

    pub fn root(&self) -> &Uri {
        &self.root
    }

    fn qualify(&self, path: &[String]) -> Result<Uri> {
        Ok(Uri::absolute(self.root.node().cloned(), path.iter().cloned())?)
    }

    /// Attach an externally implemented cell at its own uri's path
    pub fn mount(&self, cell: Arc<dyn Cell>) -> Result<Ref> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(RemotingError::spawn("guardian is stopped"));
        }
        let path = cell.uri().segments().to_vec();
        if path.is_empty() || !cell.uri().is_absolute() {
            return Err(RemotingError::invalid_uri(
                cell.uri(),
                "cells are mounted at absolute non-root paths",
            ));
        }
        let uri = self.qualify(&path)?;

        let mut entries = self.entries.write();
        if entries.contains_key(&path) {
            return Err(RemotingError::spawn(format!("{} is already taken", uri)));
        }
        entries.insert(path, Entry::Mounted(cell.clone()));
        drop(entries);

        debug!(uri = %uri, "Cell mounted");
        Ok(Ref::local(uri, cell))
    }

    /// Stop the actor at `uri` and everything below it
    pub fn stop_actor(&self, uri: &Uri) -> Result<()> {
        let path = uri.segments();
        if path.is_empty() {
            return Err(RemotingError::invalid_uri(uri, "cannot stop the root"));
        }

        let removed: Vec<Entry> = {
            let mut entries = self.entries.write();
            if !entries.contains_key(path) {
                return Err(RemotingError::lookup_failed(uri));
            }
            let doomed: Vec<Path> = entries
                .keys()
                .filter(|key| key.starts_with(path))
                .cloned()
                .collect();
            doomed
                .iter()
                .filter_map(|key| entries.remove(key))
                .collect()
        };

        debug!(uri = %uri, count = removed.len(), "Stopping actor subtree");
        removed.iter().for_each(Entry::stop);
        Ok(())
    }

    /// Number of registered cells
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn deregister(&self, cell: &Arc<MailboxCell>) {
        let mut entries = self.entries.write();
        let path = cell.uri.segments();
        let current = matches!(entries.get(path), Some(Entry::Actor(c)) if Arc::ptr_eq(c, cell));
        if current {
            entries.remove(path);
        }
    }
}

impl Guardian for LocalGuardian {
    fn lookup_ref(&self, uri: &Uri) -> Result<Ref> {
        let cell = self
            .lookup_cell(uri)
            .ok_or_else(|| RemotingError::lookup_failed(uri))?;
        Ok(Ref::local(self.qualify(uri.segments())?, cell))
    }

    fn lookup_cell(&self, uri: &Uri) -> Option<Arc<dyn Cell>> {
        self.entries.read().get(uri.segments()).map(Entry::cell)
    }

    fn spawn(
        &self,
        parent: Option<&Uri>,
        name: Option<&str>,
        behavior: Box<dyn Behavior>,
    ) -> Result<Ref> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(RemotingError::spawn("guardian is stopped"));
        }
        let runtime = Handle::try_current()
            .map_err(|e| RemotingError::spawn(format!("no tokio runtime: {}", e)))?;

        let parent_path = parent.map(|p| p.segments().to_vec()).unwrap_or_default();
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("${}", Uuid::new_v4().simple()),
        };
        let uri = self.qualify(&parent_path)?.child(&name)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let cell = Arc::new(MailboxCell {
            uri: uri.clone(),
            tx,
            stop: Mutex::new(Some(stop_tx)),
            events: self.events.clone(),
        });

        {
            let mut entries = self.entries.write();
            if !parent_path.is_empty() && !entries.contains_key(&parent_path) {
                return Err(RemotingError::lookup_failed(self.qualify(&parent_path)?));
            }
            if entries.contains_key(uri.segments()) {
                return Err(RemotingError::spawn(format!("{} is already taken", uri)));
            }
            entries.insert(uri.segments().to_vec(), Entry::Actor(cell.clone()));
        }

        let myself = Ref::local(uri.clone(), cell.clone());
        let task = ActorTask {
            ctx: ActorContext::new(myself.clone()),
            cell,
            behavior,
            mailbox: rx,
            stop: stop_rx,
            guardian: self.myself.clone(),
            watchers: HashSet::new(),
        };
        runtime.spawn(task.run());

        info!(uri = %uri, "Actor spawned");
        Ok(myself)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries: Vec<Entry> = self.entries.write().drain().map(|(_, e)| e).collect();
        info!(root = %self.root, count = entries.len(), "Guardian stopping");
        entries.iter().for_each(Entry::stop);
    }
}

/// Mailbox endpoint of a spawned actor
struct MailboxCell {
    uri: Uri,
    tx: mpsc::UnboundedSender<Message>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    events: Arc<dyn EventSink>,
}

impl MailboxCell {
    fn signal_stop(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
    }

    fn dead_ref(&self) -> Ref {
        Ref::dead(self.uri.clone(), Some(self.events.clone()))
    }
}

impl Cell for MailboxCell {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn receive(&self, message: Message) {
        if let Err(mpsc::error::SendError(message)) = self.tx.send(message) {
            // Actor already exited
            self.dead_ref().tell(message);
        }
    }
}

struct ActorTask {
    ctx: ActorContext,
    cell: Arc<MailboxCell>,
    behavior: Box<dyn Behavior>,
    mailbox: mpsc::UnboundedReceiver<Message>,
    stop: oneshot::Receiver<()>,
    guardian: Weak<LocalGuardian>,
    watchers: HashSet<Ref>,
}

impl ActorTask {
    async fn run(mut self) {
        debug!(uri = %self.cell.uri, "Actor task started");

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut self.stop => break,
                message = self.mailbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message.protocol() {
                Some(Protocol::Watched(watcher)) => {
                    self.watchers.insert(watcher.clone());
                }
                Some(Protocol::Unwatched(watcher)) => {
                    self.watchers.remove(watcher);
                }
                _ => {
                    if let Err(e) = self.behavior.receive(&self.ctx, message).await {
                        warn!(uri = %self.cell.uri, error = %e, "Actor failed, stopping");
                        break;
                    }
                }
            }
        }

        self.behavior.on_stop(&self.ctx).await;
        if let Some(guardian) = self.guardian.upgrade() {
            guardian.deregister(&self.cell);
        }

        // Anything still queued is undeliverable
        self.mailbox.close();
        let dead = self.cell.dead_ref();
        while let Ok(message) = self.mailbox.try_recv() {
            if let Some(Protocol::Watched(watcher)) = message.protocol() {
                self.watchers.insert(watcher.clone());
                continue;
            }
            if !message.is_watch_bookkeeping() {
                events::dead_letter(self.cell.events.as_ref(), &dead, message);
            }
        }

        debug!(uri = %self.cell.uri, watchers = self.watchers.len(), "Actor task finished");
        for watcher in self.watchers.drain() {
            watcher.tell(Message::terminated(dead.clone()));
        }
    }
}
