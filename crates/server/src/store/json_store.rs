//! JSON-based message storage
//!
//! One file per conversation, named by a hash of the participant pair so user
//! ids never reach the filesystem. Writes go to a temp file and are renamed
//! into place.

use crate::models::Message;
use crate::store::MessageStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Everything stored for one pair of users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationData {
    pub participants: [String; 2],
    pub messages: Vec<Message>,
}

impl ConversationData {
    fn new(key: &ConversationKey) -> Self {
        Self {
            participants: [key.0.clone(), key.1.clone()],
            messages: Vec::new(),
        }
    }
}

/// Order-independent identity of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConversationKey(String, String);

impl ConversationKey {
    fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.1.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// JSON file message store with an in-memory cache of loaded conversations
pub struct JsonMessageStore {
    storage_dir: PathBuf,
    conversations: RwLock<HashMap<ConversationKey, Arc<RwLock<ConversationData>>>>,
}

impl JsonMessageStore {
    pub async fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir).await?;

        info!("JSON message store at {:?}", storage_dir);

        Ok(Self {
            storage_dir,
            conversations: RwLock::new(HashMap::new()),
        })
    }

    fn conversation_path(&self, key: &ConversationKey) -> PathBuf {
        self.storage_dir.join(format!("{}.json", key.file_stem()))
    }

    async fn load_from_disk(path: &Path) -> Result<ConversationData> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse conversation {:?}", path))
    }

    /// Save a conversation to disk atomically
    async fn save_to_disk(&self, key: &ConversationKey, data: &ConversationData) -> Result<()> {
        let path = self.conversation_path(key);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(data)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    /// Get a cached conversation, loading it from disk or creating it empty
    async fn get_or_load(&self, key: &ConversationKey) -> Result<Arc<RwLock<ConversationData>>> {
        {
            let conversations = self.conversations.read().await;
            if let Some(conversation) = conversations.get(key) {
                return Ok(conversation.clone());
            }
        }

        let mut conversations = self.conversations.write().await;
        // Another task may have loaded it while we waited for the write lock
        if let Some(conversation) = conversations.get(key) {
            return Ok(conversation.clone());
        }

        let path = self.conversation_path(key);
        let data = if fs::try_exists(&path).await? {
            debug!("Loading conversation from {:?}", path);
            Self::load_from_disk(&path).await?
        } else {
            ConversationData::new(key)
        };

        let conversation = Arc::new(RwLock::new(data));
        conversations.insert(key.clone(), conversation.clone());
        Ok(conversation)
    }
}

#[async_trait]
impl MessageStore for JsonMessageStore {
    async fn insert(&self, message: Message) -> Result<Message> {
        let key = ConversationKey::new(&message.sender_id, &message.receiver_id);
        let conversation = self.get_or_load(&key).await?;
        let mut data = conversation.write().await;

        data.messages.push(message.clone());
        if let Err(e) = self.save_to_disk(&key, &data).await {
            data.messages.pop();
            return Err(e.context("Failed to persist message"));
        }

        debug!(
            "Stored message {} ({} -> {})",
            message.id, message.sender_id, message.receiver_id
        );
        Ok(message)
    }

    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>> {
        let key = ConversationKey::new(a, b);
        let conversation = self.get_or_load(&key).await?;
        let data = conversation.read().await;
        Ok(data
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }

    async fn mark_seen(&self, sender: &str, receiver: &str) -> Result<usize> {
        let key = ConversationKey::new(sender, receiver);
        let conversation = self.get_or_load(&key).await?;
        let mut data = conversation.write().await;

        let mut changed = 0;
        for message in data
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == sender && m.receiver_id == receiver)
        {
            if message.mark_seen() {
                changed += 1;
            }
        }

        if changed > 0 {
            self.save_to_disk(&key, &data).await?;
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_and_read_both_directions() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonMessageStore::new(temp_dir.path()).await.unwrap();

        store
            .insert(Message::new("alice", "bob").with_text("hi bob"))
            .await
            .unwrap();
        store
            .insert(Message::new("bob", "alice").with_text("hi alice"))
            .await
            .unwrap();
        store
            .insert(Message::new("alice", "carol").with_text("unrelated"))
            .await
            .unwrap();

        let messages = store.conversation("bob", "alice").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text.as_deref(), Some("hi bob"));
        assert_eq!(messages[1].text.as_deref(), Some("hi alice"));
    }

    #[tokio::test]
    async fn test_mark_seen_only_touches_one_direction() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonMessageStore::new(temp_dir.path()).await.unwrap();

        store.insert(Message::new("alice", "bob").with_text("1")).await.unwrap();
        store.insert(Message::new("alice", "bob").with_text("2")).await.unwrap();
        store.insert(Message::new("bob", "alice").with_text("3")).await.unwrap();

        assert_eq!(store.mark_seen("alice", "bob").await.unwrap(), 2);
        // Second pass is a no-op, not an error
        assert_eq!(store.mark_seen("alice", "bob").await.unwrap(), 0);

        let messages = store.conversation("alice", "bob").await.unwrap();
        let seen: Vec<bool> = messages.iter().map(|m| m.seen).collect();
        assert_eq!(seen, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = JsonMessageStore::new(temp_dir.path()).await.unwrap();
            store
                .insert(Message::new("alice", "bob").with_text("persisted"))
                .await
                .unwrap();
            store.mark_seen("alice", "bob").await.unwrap();
        }

        let store = JsonMessageStore::new(temp_dir.path()).await.unwrap();
        let messages = store.conversation("alice", "bob").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text.as_deref(), Some("persisted"));
        assert!(messages[0].seen);
    }

    #[tokio::test]
    async fn test_hostile_ids_stay_inside_storage_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonMessageStore::new(temp_dir.path()).await.unwrap();

        store
            .insert(Message::new("../../etc", "passwd").with_text("nope"))
            .await
            .unwrap();

        let mut entries = std::fs::read_dir(temp_dir.path()).unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert!(entry.file_name().to_string_lossy().ends_with(".json"));
        assert!(entries.next().is_none());
    }
}
