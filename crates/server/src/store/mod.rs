//! Persistence for messages and users
//!
//! Messages live in JSON conversation files written atomically; the user
//! directory is a small SQLite database.

pub mod json_store;
pub mod users;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Message;

pub use json_store::JsonMessageStore;
pub use users::UserDirectory;

/// Append-only message storage with the two queries the chat needs
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message and return it as stored
    async fn insert(&self, message: Message) -> Result<Message>;

    /// Both directions of the conversation between `a` and `b`, in insertion order
    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>>;

    /// Mark every unseen message from `sender` to `receiver` as seen.
    /// Returns how many messages changed.
    async fn mark_seen(&self, sender: &str, receiver: &str) -> Result<usize>;
}
