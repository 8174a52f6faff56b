//! Live websocket connections and their outbound queues

use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ConnectionId, PushChannel, ServerEvent};

/// Events a socket may have queued before further ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Routes events to live sockets. Each socket task drains its own queue.
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    capacity: usize,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a connection and hand back the queue its socket task reads
    pub fn attach(&self, connection: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.connections.write().insert(connection, tx);
        rx
    }

    pub fn detach(&self, connection: &ConnectionId) {
        if self.connections.write().remove(connection).is_some() {
            debug!("Detached connection {}", connection);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

/// Push is at-most-once: a full queue drops the event
fn enqueue(
    connection: &ConnectionId,
    tx: &mpsc::Sender<ServerEvent>,
    event: &ServerEvent,
) -> bool {
    match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Queue full for connection {}, dropping event", connection);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

impl PushChannel for ConnectionHub {
    fn emit(&self, connection: &ConnectionId, event: &ServerEvent) -> bool {
        match self.connections.read().get(connection) {
            Some(tx) => enqueue(connection, tx, event),
            None => false,
        }
    }

    fn broadcast(&self, event: &ServerEvent) {
        for (connection, tx) in self.connections.read().iter() {
            enqueue(connection, tx, event);
        }
    }
}
