/// Inbound broadcasts, validated at the subscription boundary
use crate::error::{ChatError, Result};
use crate::model::{Message, TypingEvent};
use crate::transport::TopicKind;
use serde::Deserialize;

/// Events pushed by the broker for the open conversation
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A new message was broadcast
    Message(Message),
    /// Someone started or stopped typing
    Typing(TypingEvent),
    /// Server view of a message after a reaction toggle
    ReactionsChanged(Message),
    Edited(Message),
    Deleted { message_id: i64 },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedNotice {
    message_id: i64,
}

impl ChatEvent {
    /// Parse a broadcast received on `kind`'s topic for `conversation_id`.
    ///
    /// Payloads that do not match the topic's shape, or that name another
    /// conversation, are rejected.
    pub fn decode(kind: TopicKind, conversation_id: i64, body: &str) -> Result<Self> {
        let event = match kind {
            TopicKind::Messages => ChatEvent::Message(serde_json::from_str(body)?),
            TopicKind::Typing => ChatEvent::Typing(serde_json::from_str(body)?),
            TopicKind::Reactions => ChatEvent::ReactionsChanged(serde_json::from_str(body)?),
            TopicKind::Edits => ChatEvent::Edited(serde_json::from_str(body)?),
            TopicKind::Deletions => {
                let notice: DeletedNotice = serde_json::from_str(body)?;
                ChatEvent::Deleted {
                    message_id: notice.message_id,
                }
            }
        };

        match event.conversation_id() {
            Some(actual) if actual != conversation_id => Err(ChatError::Protocol(format!(
                "Event for conversation {} received on topic of {}",
                actual, conversation_id
            ))),
            _ => Ok(event),
        }
    }

    /// Conversation named by the payload (deletion notices carry none)
    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            ChatEvent::Message(m) | ChatEvent::ReactionsChanged(m) | ChatEvent::Edited(m) => {
                Some(m.conversation_id)
            }
            ChatEvent::Typing(t) => Some(t.conversation_id),
            ChatEvent::Deleted { .. } => None,
        }
    }
}
