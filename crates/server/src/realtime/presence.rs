//! Presence registry
//!
//! Single-process map of user id to their live connection. One connection
//! per user; a reconnect replaces the previous entry. Every change is
//! followed by a broadcast of the full online set.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{ConnectionId, PushChannel, ServerEvent};

pub struct PresenceRegistry {
    entries: RwLock<HashMap<String, ConnectionId>>,
    push: Arc<dyn PushChannel>,
}

impl PresenceRegistry {
    pub fn new(push: Arc<dyn PushChannel>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            push,
        }
    }

    /// Map `user_id` to `connection`, replacing any previous connection
    pub fn register(&self, user_id: &str, connection: ConnectionId) {
        let mut entries = self.entries.write();
        match entries.insert(user_id.to_string(), connection.clone()) {
            Some(old) => info!("{} reconnected ({} replaces {})", user_id, connection, old),
            None => info!("{} is online ({})", user_id, connection),
        }
        self.broadcast_online(&entries);
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.read().get(user_id).cloned()
    }

    /// Drop `user_id` regardless of which connection it points at. No-op if absent.
    pub fn remove(&self, user_id: &str) {
        let mut entries = self.entries.write();
        if entries.remove(user_id).is_some() {
            info!("{} is offline", user_id);
        }
        self.broadcast_online(&entries);
    }

    /// Drop `user_id` only if it still points at `connection`.
    ///
    /// A socket closing after its user already reconnected elsewhere must not
    /// take the newer connection offline. Returns whether an entry was removed.
    pub fn release(&self, user_id: &str, connection: &ConnectionId) -> bool {
        let mut entries = self.entries.write();
        let removed = entries.get(user_id) == Some(connection);
        if removed {
            entries.remove(user_id);
            info!("{} is offline ({})", user_id, connection);
        }
        self.broadcast_online(&entries);
        removed
    }

    /// Ids of everyone currently online, sorted
    pub fn snapshot(&self) -> Vec<String> {
        sorted_ids(&self.entries.read())
    }

    /// Forget everyone. Used at shutdown; does not broadcast.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Called with the write guard held so broadcasts go out in mutation order
    fn broadcast_online(&self, entries: &HashMap<String, ConnectionId>) {
        self.push
            .broadcast(&ServerEvent::GetOnlineUsers(sorted_ids(entries)));
    }
}

fn sorted_ids(entries: &HashMap<String, ConnectionId>) -> Vec<String> {
    let mut online: Vec<String> = entries.keys().cloned().collect();
    online.sort();
    online
}
