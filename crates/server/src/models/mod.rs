use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known id of the AI contact. Never stored in the user table.
pub const AI_USER_ID: &str = "ai-chatty";

/// Display name of the AI contact.
pub const AI_DISPLAY_NAME: &str = "Chatty AI";

pub fn is_ai_user(user_id: &str) -> bool {
    user_id == AI_USER_ID
}

/// A chat participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub is_ai: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The synthetic record for the AI contact.
    pub fn ai_contact() -> Self {
        Self {
            id: AI_USER_ID.to_string(),
            full_name: AI_DISPLAY_NAME.to_string(),
            profile_pic: None,
            is_ai: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// A single direct message between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub audio_duration: Option<f64>,
    #[serde(default)]
    pub seen: bool,
    /// Free-form annotations, set on AI replies
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: impl Into<String>, receiver_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            text: None,
            image: None,
            audio: None,
            audio_duration: None,
            seen: false,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, url: Option<String>) -> Self {
        self.image = url;
        self
    }

    /// The duration is only kept alongside an actual clip
    pub fn with_audio(mut self, url: Option<String>, duration: Option<f64>) -> Self {
        self.audio_duration = url.as_ref().and(duration);
        self.audio = url;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Flip `seen` to true. Returns whether the state actually changed.
    pub fn mark_seen(&mut self) -> bool {
        let changed = !self.seen;
        self.seen = true;
        changed
    }

    /// True if the message belongs to the conversation between `a` and `b`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

/// Content submitted by a client for a new message.
///
/// `image` and `audio` carry embedded `data:` URLs; anything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub audio_duration: Option<f64>,
}

impl MessageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn has_content(&self) -> bool {
        fn present(field: &Option<String>) -> bool {
            field.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        self.trimmed_text().is_some() || present(&self.image) || present(&self.audio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a user's conversation with the AI contact
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// View `message` as a turn of `user_id`'s AI conversation.
    pub fn from_message(user_id: &str, message: Message) -> Self {
        let role = if message.sender_id == user_id {
            Role::User
        } else {
            Role::Assistant
        };
        Self {
            id: message.id,
            user_id: user_id.to_string(),
            role,
            text: message.text,
            image: message.image,
            audio: message.audio,
            metadata: message.metadata,
            created_at: message.created_at,
        }
    }
}
