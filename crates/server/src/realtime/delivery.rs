//! Delivery fan-out of chat events to live connections

use std::sync::Arc;
use tracing::debug;

use super::{PresenceRegistry, PushChannel, ServerEvent};
use crate::models::Message;

#[derive(Clone)]
pub struct Delivery {
    presence: Arc<PresenceRegistry>,
    push: Arc<dyn PushChannel>,
}

impl Delivery {
    pub fn new(presence: Arc<PresenceRegistry>, push: Arc<dyn PushChannel>) -> Self {
        Self { presence, push }
    }

    /// Push a new message to the receiver and the sender, whichever are
    /// online. Returns the number of connections reached.
    pub fn deliver_message(&self, message: &Message) -> usize {
        let event = ServerEvent::NewMessage(message.clone());
        let mut recipients = vec![message.receiver_id.as_str()];
        if message.sender_id != message.receiver_id {
            recipients.push(message.sender_id.as_str());
        }

        let mut delivered = 0;
        for user_id in recipients {
            if let Some(connection) = self.presence.lookup(user_id) {
                if self.push.emit(&connection, &event) {
                    delivered += 1;
                }
            }
        }

        debug!("Message {} pushed to {} connection(s)", message.id, delivered);
        delivered
    }

    /// Tell `author` that `reader` has seen their messages
    pub fn notify_seen(&self, author: &str, reader: &str) -> bool {
        match self.presence.lookup(author) {
            Some(connection) => self.push.emit(
                &connection,
                &ServerEvent::MessagesSeen {
                    from: reader.to_string(),
                },
            ),
            None => false,
        }
    }
}
