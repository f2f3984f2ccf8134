//! Test helpers

use crate::guardian::Cell;
use crate::message::Message;
use addressing::Uri;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cell that records every delivery synchronously
#[derive(Debug)]
pub struct ProbeCell {
    uri: Uri,
    received: Mutex<Vec<Message>>,
}

impl ProbeCell {
    pub fn new(uri: Uri) -> Arc<Self> {
        Arc::new(Self {
            uri,
            received: Mutex::new(Vec::new()),
        })
    }

    /// All messages received so far
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Drain received messages
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.received.lock())
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

impl Cell for ProbeCell {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn receive(&self, message: Message) {
        self.received.lock().push(message);
    }
}
