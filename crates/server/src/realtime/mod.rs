//! Real-time layer: who is online, and pushing events to their sockets
//!
//! Push is best effort. An event for a user without a live connection is
//! dropped; clients recover by re-fetching the conversation.

pub mod delivery;
pub mod hub;
pub mod presence;

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::Message;

pub use delivery::Delivery;
pub use hub::ConnectionHub;
pub use presence::PresenceRegistry;

/// Identity of one live websocket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server to client frame: `{"event": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    MessagesSeen { from: String },
    GetOnlineUsers(Vec<String>),
    Pong,
}

/// The push side of the real-time channel
pub trait PushChannel: Send + Sync {
    /// Send to one connection. Returns false if it is gone.
    fn emit(&self, connection: &ConnectionId, event: &ServerEvent) -> bool;

    /// Send to every live connection
    fn broadcast(&self, event: &ServerEvent);
}
