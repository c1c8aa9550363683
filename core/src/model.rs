/// Wire and in-memory types shared by the chat components
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Short identity of a user as embedded in messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

/// Member of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<NaiveDateTime>,
}

/// Identifier of a message.
///
/// Server-confirmed messages carry the backend's numeric id. Optimistic
/// placeholders get a local UUID, so the two can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Local(Uuid),
}

impl MessageId {
    pub fn new_local() -> Self {
        MessageId::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    /// Numeric id usable in REST paths
    pub fn server_id(&self) -> Option<i64> {
        match self {
            MessageId::Server(id) => Some(*id),
            MessageId::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "{}", id),
            MessageId::Local(uuid) => write!(f, "local-{}", uuid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    #[serde(other)]
    Other,
}

/// Reactions on a message: emoji -> names of the users who reacted.
///
/// The backend sends reactors as user objects, optimistic updates work on
/// names; both shapes are accepted on input. Empty reactor sets are never kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reactions(BTreeMap<String, BTreeSet<String>>);

impl Reactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reactors(&self, emoji: &str) -> Option<&BTreeSet<String>> {
        self.0.get(emoji)
    }

    pub fn contains(&self, emoji: &str, name: &str) -> bool {
        self.0.get(emoji).is_some_and(|set| set.contains(name))
    }

    pub fn insert(&mut self, emoji: &str, name: &str) -> bool {
        self.0
            .entry(emoji.to_string())
            .or_default()
            .insert(name.to_string())
    }

    pub fn remove(&mut self, emoji: &str, name: &str) -> bool {
        let Some(set) = self.0.get_mut(emoji) else {
            return false;
        };
        let removed = set.remove(name);
        if set.is_empty() {
            self.0.remove(emoji);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReactorRepr {
    Name(String),
    User(UserSummary),
}

impl<'de> Deserialize<'de> for Reactions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<BTreeMap<String, Vec<ReactorRepr>>> = Option::deserialize(deserializer)?;
        let mut reactions = Reactions::new();
        for (emoji, reactors) in raw.unwrap_or_default() {
            for reactor in reactors {
                let name = match reactor {
                    ReactorRepr::Name(name) => name,
                    ReactorRepr::User(user) => user.name,
                };
                reactions.insert(&emoji, &name);
            }
        }
        Ok(reactions)
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "messageId")]
    pub id: MessageId,
    pub conversation_id: i64,
    pub sender: UserSummary,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_edited: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub reactions: Reactions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_by: Vec<UserSummary>,
}

impl Message {
    /// Optimistic local copy of a message the current user is sending
    pub fn placeholder(conversation_id: i64, sender: UserSummary, content: String) -> Self {
        Self {
            id: MessageId::new_local(),
            conversation_id,
            sender,
            content: Some(content),
            kind: MessageKind::Text,
            is_edited: false,
            is_deleted: false,
            created_at: chrono::Local::now().naive_local(),
            updated_at: None,
            reactions: Reactions::new(),
            read_by: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// A chat thread between two or more participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_avatar: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl Conversation {
    /// Name shown in lists: the group name, or the other participant for 1-on-1s
    pub fn display_name(&self, current_user_id: i64) -> String {
        if self.is_group {
            return match self.group_name.as_deref() {
                Some(name) if !name.trim().is_empty() => name.to_string(),
                _ => "Untitled".to_string(),
            };
        }
        self.participants
            .iter()
            .find(|p| p.user_id != current_user_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// True for a 1-on-1 between `current_user_id` and `other_id`
    pub fn is_direct_with(&self, current_user_id: i64, other_id: i64) -> bool {
        if self.is_group || self.participants.len() != 2 || other_id == current_user_id {
            return false;
        }
        let has = |id: i64| self.participants.iter().any(|p| p.user_id == id);
        has(current_user_id) && has(other_id)
    }
}

/// Presence notice for the typing indicator. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub conversation_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub is_typing: bool,
}

/// Payload published to the send destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<i64>,
    pub is_group: bool,
    pub group_name: Option<String>,
}

/// One page of message history. `content` is newest-first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub content: Vec<Message>,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default = "default_last")]
    pub last: bool,
}

fn default_last() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_backend_json() {
        let json = r#"{
            "messageId": 42,
            "conversationId": 3,
            "sender": {"userId": 9, "name": "Grace", "email": "g@uni.edu"},
            "content": "hello",
            "type": "TEXT",
            "isEdited": null,
            "isDeleted": false,
            "createdAt": "2024-05-01T10:15:30.123456",
            "reactions": {"👍": [{"userId": 1, "name": "Ada", "email": "a@uni.edu"}]},
            "readBy": null
        }"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, MessageId::Server(42));
        assert_eq!(msg.text(), "hello");
        assert!(!msg.is_edited);
        assert!(msg.reactions.contains("👍", "Ada"));
        assert!(msg.read_by.is_empty());
    }

    #[test]
    fn test_reactions_accept_plain_names() {
        let reactions: Reactions = serde_json::from_str(r#"{"🎉": ["Ada", "Grace"], "👀": []}"#).unwrap();
        assert_eq!(reactions.reactors("🎉").unwrap().len(), 2);
        assert!(reactions.reactors("👀").is_none());
    }

    #[test]
    fn test_unknown_message_kind() {
        let kind: MessageKind = serde_json::from_str(r#""SYSTEM""#).unwrap();
        assert_eq!(kind, MessageKind::Other);
    }

    #[test]
    fn test_local_ids_never_match_server_ids() {
        let local = MessageId::new_local();
        assert!(local.is_local());
        assert_eq!(local.server_id(), None);
        assert_ne!(local, MessageId::Server(0));
    }

    #[test]
    fn test_display_name() {
        let ada = Participant {
            user_id: 1,
            name: "Ada".into(),
            email: String::new(),
            is_admin: true,
            last_read_at: None,
        };
        let grace = Participant {
            user_id: 2,
            name: "Grace".into(),
            ..ada.clone()
        };
        let mut conv = Conversation {
            conversation_id: 5,
            is_group: false,
            group_name: None,
            group_avatar: None,
            participants: vec![ada, grace],
            last_message: None,
            unread_count: 0,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(conv.display_name(1), "Grace");
        assert!(conv.is_direct_with(1, 2));
        assert!(!conv.is_direct_with(1, 1));
        assert!(!conv.is_direct_with(3, 2));

        conv.is_group = true;
        assert_eq!(conv.display_name(1), "Untitled");
        assert!(!conv.is_direct_with(1, 2));
    }

    #[test]
    fn test_send_request_wire_shape() {
        let req = SendMessageRequest {
            conversation_id: 3,
            content: "hi".into(),
            kind: MessageKind::Text,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["conversationId"], 3);
        assert_eq!(value["type"], "TEXT");
    }
}
