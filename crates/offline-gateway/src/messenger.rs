//! # Client Messenger
//!
//! Delivers events to attached application instances. Events raised while no
//! instance is attached wait in a FIFO queue until one asks for them.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Identifier of an attached application instance
pub type ClientId = u64;

/// Event sent to an application instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Open the notifications panel
    OpenPanel,
    /// Record a click on a presented notification, carrying its push payload
    TrackClick { notification: Value },
}

/// Command sent by an application instance to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    SendQueuedMessages,
}

struct AttachedClient {
    id: ClientId,
    sender: UnboundedSender<ClientEvent>,
}

#[derive(Default)]
struct MessengerState {
    clients: Vec<AttachedClient>,
    pending: VecDeque<ClientEvent>,
    next_id: ClientId,
}

impl MessengerState {
    /// First attached instance whose receiver is still alive
    fn first_client(&mut self) -> Option<&AttachedClient> {
        self.clients.retain(|client| !client.sender.is_closed());
        self.clients.first()
    }
}

#[derive(Default)]
pub struct ClientMessenger {
    state: Mutex<MessengerState>,
}

impl ClientMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an application instance; events arrive on the returned receiver.
    ///
    /// Dropping the receiver detaches the instance.
    pub fn attach(&self) -> (ClientId, UnboundedReceiver<ClientEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.clients.push(AttachedClient { id, sender });
        debug!(client = id, "Client attached");
        (id, receiver)
    }

    pub fn detach(&self, id: ClientId) {
        self.state.lock().clients.retain(|client| client.id != id);
        debug!(client = id, "Client detached");
    }

    pub fn attached_count(&self) -> usize {
        let mut state = self.state.lock();
        state.clients.retain(|client| !client.sender.is_closed());
        state.clients.len()
    }

    /// First attached instance, the one events are delivered to
    pub fn first_attached(&self) -> Option<ClientId> {
        self.state.lock().first_client().map(|client| client.id)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Send to the first attached instance, or queue when none is attached.
    ///
    /// Returns whether the event was sent immediately.
    pub fn deliver(&self, event: ClientEvent) -> bool {
        let mut state = self.state.lock();
        if let Some(client) = state.first_client() {
            // Fire and forget; a receiver dropped since the check just loses it
            let _ = client.sender.send(event);
            return true;
        }

        debug!(event = ?event, "No client attached, queueing event");
        state.pending.push_back(event);
        false
    }

    /// Drain the queue in insertion order to the first attached instance.
    ///
    /// Returns the number of events sent. With nobody attached the queue is
    /// left untouched.
    pub fn flush(&self) -> usize {
        let mut state = self.state.lock();
        let Some(sender) = state.first_client().map(|client| client.sender.clone()) else {
            return 0;
        };

        let mut sent = 0;
        while let Some(event) = state.pending.pop_front() {
            let _ = sender.send(event);
            sent += 1;
        }

        if sent > 0 {
            debug!(sent = sent, "Flushed queued events");
        }
        sent
    }
}
