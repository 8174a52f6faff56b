//! Conversation Service
//!
//! Sending, reading and seen-marking of one-to-one messages. The AI contact
//! is an ordinary participant here: a message addressed to it is answered by
//! the responder, and the answer goes through the same store and fan-out.
//! The AI thread endpoints are views over that same conversation.

use anyhow::anyhow;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::media::{MediaIngest, MediaKind};
use crate::models::{is_ai_user, Message, MessageInput, Turn, AI_USER_ID};
use crate::realtime::Delivery;
use crate::responder::{Prompt, Reply, Responder, SkillKind};
use crate::store::MessageStore;

/// Placeholder the AI contact sends when answering fails outright
pub const AI_REPLY_FAILED: &str = "🤖 Sorry, AI service is temporarily unavailable. Please try again.";

/// Result of a send: the stored message and, for the AI contact, its answer
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub reply: Option<Message>,
}

pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    media: MediaIngest,
    delivery: Delivery,
    responder: Arc<Responder>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        media: MediaIngest,
        delivery: Delivery,
        responder: Arc<Responder>,
    ) -> Self {
        Self {
            store,
            media,
            delivery,
            responder,
        }
    }

    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        input: MessageInput,
    ) -> Result<SendOutcome> {
        validate(sender_id, receiver_id, &input)?;

        // Upload errors abort the send before anything is stored
        let image = self.media.ingest(input.image.as_deref(), MediaKind::Image).await?;
        let audio = self.media.ingest(input.audio.as_deref(), MediaKind::Audio).await?;

        let mut message = Message::new(sender_id, receiver_id)
            .with_image(image)
            .with_audio(audio, input.audio_duration);
        if let Some(text) = input.trimmed_text() {
            message = message.with_text(text);
        }

        let has_media = message.image.is_some() || message.audio.is_some();
        if message.text.is_none() && !has_media {
            // Only non-embedded media references were given
            return Err(Error::Validation("Message has no usable content".into()));
        }
        let message = self.store.insert(message).await.map_err(|e| {
            if has_media {
                warn!("Uploaded media left without a message: {}", e);
            }
            Error::Internal(e)
        })?;
        info!("Message {} from {} to {}", message.id, sender_id, receiver_id);
        self.delivery.deliver_message(&message);

        let reply = if is_ai_user(receiver_id) {
            Some(self.reply_as_ai(&message).await?)
        } else {
            None
        };

        Ok(SendOutcome { message, reply })
    }

    /// Answer `prompt_message` as the AI contact, then store and push the answer
    async fn reply_as_ai(&self, prompt_message: &Message) -> Result<Message> {
        let prompt = Prompt {
            text: prompt_message.text.clone(),
            image_url: prompt_message.image.clone(),
            audio_url: prompt_message.audio.clone(),
        };

        let reply = match AssertUnwindSafe(self.responder.respond(&prompt))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(_) => {
                error!("[Chatty AI] Responder panicked, sending placeholder");
                Reply::fallback(AI_REPLY_FAILED, SkillKind::Ai)
            }
        };

        let answer = Message::new(AI_USER_ID, &prompt_message.sender_id)
            .with_text(reply.text.clone())
            .with_metadata(reply.metadata());
        let answer = self.store.insert(answer).await?;
        info!(
            "[Chatty AI] Replied to {} via {:?} skill (degraded: {})",
            prompt_message.sender_id, reply.skill, reply.degraded
        );
        self.delivery.deliver_message(&answer);
        Ok(answer)
    }

    /// Full history between `reader` and `partner`.
    ///
    /// Marks the partner's unseen messages to `reader` as seen first and tells
    /// the partner when anything changed.
    pub async fn get_conversation(&self, reader_id: &str, partner_id: &str) -> Result<Vec<Message>> {
        let changed = self.store.mark_seen(partner_id, reader_id).await?;
        if changed > 0 {
            self.delivery.notify_seen(partner_id, reader_id);
        }
        Ok(self.store.conversation(reader_id, partner_id).await?)
    }

    /// Send to the AI contact and return `[user turn, assistant turn]`
    pub async fn send_ai_message(&self, user_id: &str, input: MessageInput) -> Result<[Turn; 2]> {
        let outcome = self.send_message(user_id, AI_USER_ID, input).await?;
        let reply = outcome
            .reply
            .ok_or_else(|| anyhow!("AI contact produced no reply"))?;
        Ok([
            Turn::from_message(user_id, outcome.message),
            Turn::from_message(user_id, reply),
        ])
    }

    /// The user's conversation with the AI contact, as turns
    pub async fn ai_history(&self, user_id: &str) -> Result<Vec<Turn>> {
        let messages = self.get_conversation(user_id, AI_USER_ID).await?;
        Ok(messages
            .into_iter()
            .map(|m| Turn::from_message(user_id, m))
            .collect())
    }
}

fn validate(sender_id: &str, receiver_id: &str, input: &MessageInput) -> Result<()> {
    if sender_id.trim().is_empty() || receiver_id.trim().is_empty() {
        return Err(Error::Validation("Sender and receiver are required".into()));
    }
    if is_ai_user(sender_id) {
        return Err(Error::Validation("Cannot send as the AI contact".into()));
    }
    if !input.has_content() {
        return Err(Error::Validation(
            "Message needs text, an image or an audio clip".into(),
        ));
    }
    if let Some(duration) = input.audio_duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::Validation("Invalid audio duration".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::RecordingStore;
    use crate::models::Role;
    use crate::realtime::tests::RecordingPush;
    use crate::realtime::{ConnectionId, PresenceRegistry, ServerEvent};
    use crate::responder::ai::tests::ScriptedAi;
    use crate::responder::tests::responder;
    use crate::responder::weather::tests::FakeWeather;
    use crate::store::JsonMessageStore;
    use tempfile::TempDir;

    const PNG: &str = "data:image/png;base64,aGVsbG8=";

    struct Harness {
        service: ConversationService,
        uploads: Arc<RecordingStore>,
        push: Arc<RecordingPush>,
        presence: Arc<PresenceRegistry>,
        ai: Arc<ScriptedAi>,
        _dir: TempDir,
    }

    async fn harness_with(uploads: RecordingStore) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonMessageStore::new(dir.path()).await.unwrap());
        let uploads = Arc::new(uploads);
        let push = Arc::new(RecordingPush::default());
        let presence = Arc::new(PresenceRegistry::new(push.clone()));
        let ai = Arc::new(ScriptedAi::always_ok("Hello from the bot"));

        let service = ConversationService::new(
            store,
            MediaIngest::new(uploads.clone(), 1024),
            Delivery::new(presence.clone(), push.clone()),
            Arc::new(responder(
                Arc::new(FakeWeather::with_city("Kolkata", "IN")),
                ai.clone(),
            )),
        );

        Harness {
            service,
            uploads,
            push,
            presence,
            ai,
            _dir: dir,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecordingStore::default()).await
    }

    fn new_messages(push: &RecordingPush) -> Vec<(String, Message)> {
        push.emitted
            .lock()
            .iter()
            .filter_map(|(conn, event)| match event {
                ServerEvent::NewMessage(m) => Some((conn.to_string(), m.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn image_only_message_is_stored_and_pushed_once() {
        let h = harness().await;
        h.presence.register("bob", ConnectionId::from("cb"));

        let input = MessageInput {
            image: Some(PNG.into()),
            ..Default::default()
        };
        let outcome = h.service.send_message("alice", "bob", input).await.unwrap();

        assert_eq!(outcome.message.text, None);
        assert_eq!(
            outcome.message.image.as_deref(),
            Some("https://cdn.test/chat-images/1")
        );
        assert!(outcome.reply.is_none());

        let pushed = new_messages(&h.push);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, "cb");
        assert_eq!(pushed[0].1.id, outcome.message.id);

        let history = h.service.get_conversation("alice", "bob").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_upload() {
        let h = harness().await;
        let input = MessageInput {
            text: Some("   ".into()),
            image: Some(String::new()),
            ..Default::default()
        };

        let err = h.service.send_message("alice", "bob", input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(h.uploads.uploads.lock().is_empty());
    }

    #[tokio::test]
    async fn bad_audio_duration_is_rejected() {
        let h = harness().await;
        let input = MessageInput {
            text: Some("voice".into()),
            audio_duration: Some(f64::NAN),
            ..Default::default()
        };
        let err = h.service.send_message("alice", "bob", input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn duration_without_uploaded_audio_is_dropped() {
        let h = harness().await;
        let input = MessageInput {
            text: Some("voice".into()),
            audio: Some("https://already.hosted/clip.webm".into()),
            audio_duration: Some(4.5),
            ..Default::default()
        };
        let outcome = h.service.send_message("alice", "bob", input).await.unwrap();
        assert_eq!(outcome.message.audio, None);
        assert_eq!(outcome.message.audio_duration, None);

        let input = MessageInput {
            audio: Some("data:audio/webm;base64,aGVsbG8=".into()),
            audio_duration: Some(4.5),
            ..Default::default()
        };
        let outcome = h.service.send_message("alice", "bob", input).await.unwrap();
        assert!(outcome.message.audio.is_some());
        assert_eq!(outcome.message.audio_duration, Some(4.5));
    }

    #[tokio::test]
    async fn cannot_send_as_ai() {
        let h = harness().await;
        let err = h
            .service
            .send_message(AI_USER_ID, "alice", MessageInput::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn upload_failure_aborts_send() {
        let h = harness_with(RecordingStore {
            fail: true,
            ..Default::default()
        })
        .await;
        let input = MessageInput {
            text: Some("look".into()),
            image: Some(PNG.into()),
            ..Default::default()
        };

        let err = h.service.send_message("alice", "bob", input).await.unwrap_err();
        assert!(matches!(err, Error::Upload(_)));
        assert!(h
            .service
            .get_conversation("alice", "bob")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reading_marks_seen_and_notifies_author_once() {
        let h = harness().await;
        h.presence.register("alice", ConnectionId::from("ca"));
        h.service
            .send_message("alice", "bob", MessageInput::text("hi"))
            .await
            .unwrap();

        let history = h.service.get_conversation("bob", "alice").await.unwrap();
        assert!(history[0].seen);
        // Second read changes nothing and sends nothing
        h.service.get_conversation("bob", "alice").await.unwrap();

        let notices: Vec<_> = h
            .push
            .emitted
            .lock()
            .iter()
            .filter(|(_, e)| matches!(e, ServerEvent::MessagesSeen { .. }))
            .cloned()
            .collect();
        assert_eq!(
            notices,
            vec![(
                ConnectionId::from("ca"),
                ServerEvent::MessagesSeen { from: "bob".into() }
            )]
        );
    }

    #[tokio::test]
    async fn sender_reading_own_messages_leaves_them_unseen() {
        let h = harness().await;
        h.service
            .send_message("alice", "bob", MessageInput::text("hi"))
            .await
            .unwrap();

        let history = h.service.get_conversation("alice", "bob").await.unwrap();
        assert!(!history[0].seen);
    }

    #[tokio::test]
    async fn message_to_ai_gets_stored_and_pushed_reply() {
        let h = harness().await;
        h.presence.register("alice", ConnectionId::from("ca"));

        let outcome = h
            .service
            .send_message("alice", AI_USER_ID, MessageInput::text("hello"))
            .await
            .unwrap();

        let reply = outcome.reply.unwrap();
        assert_eq!(reply.sender_id, AI_USER_ID);
        assert_eq!(reply.receiver_id, "alice");
        assert_eq!(reply.text.as_deref(), Some("Hello from the bot"));
        assert_eq!(reply.metadata["skill"], "ai");
        assert_eq!(h.ai.calls(), 1);

        let pushed: Vec<String> = new_messages(&h.push).into_iter().map(|(_, m)| m.id).collect();
        assert_eq!(pushed, vec![outcome.message.id.clone(), reply.id.clone()]);
    }

    #[tokio::test]
    async fn weather_question_to_ai_uses_weather_skill() {
        let h = harness().await;
        let outcome = h
            .service
            .send_message("alice", AI_USER_ID, MessageInput::text("weather in kolkata"))
            .await
            .unwrap();

        let reply = outcome.reply.unwrap();
        assert_eq!(reply.metadata["skill"], "weather");
        assert!(reply.text.unwrap().contains("Kolkata"));
        assert_eq!(h.ai.calls(), 0);
    }

    #[tokio::test]
    async fn ai_thread_is_a_view_over_messages() {
        let h = harness().await;

        let [user_turn, bot_turn] = h
            .service
            .send_ai_message("alice", MessageInput::text("hello"))
            .await
            .unwrap();
        assert_eq!(user_turn.role, Role::User);
        assert_eq!(bot_turn.role, Role::Assistant);
        assert_eq!(bot_turn.text.as_deref(), Some("Hello from the bot"));

        let history = h.service.ai_history("alice").await.unwrap();
        assert_eq!(history, vec![user_turn, bot_turn]);

        // Same records as the plain conversation
        let messages = h.service.get_conversation("alice", AI_USER_ID).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].seen);
    }
}
