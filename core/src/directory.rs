/// Conversation directory: the current user's conversations with unread
/// counts and last-message previews
use crate::api::ChatApi;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, CreateConversationRequest, Message};
use tracing::{debug, info, warn};

pub struct ConversationDirectory {
    current_user_id: i64,
    /// Most recent activity first
    conversations: Vec<Conversation>,
}

impl ConversationDirectory {
    pub fn new(current_user_id: i64) -> Self {
        Self {
            current_user_id,
            conversations: Vec::new(),
        }
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: i64) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.conversation_id == conversation_id)
    }

    fn get_mut(&mut self, conversation_id: i64) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.conversation_id == conversation_id)
    }

    /// Replace the snapshot with the server's list (server order is kept)
    pub fn replace(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    /// Fetch the list from the server. On failure the stale snapshot stays.
    pub async fn refresh(&mut self, api: &dyn ChatApi) -> Result<&[Conversation]> {
        let conversations = api.list_conversations().await?;
        debug!("Loaded {} conversations", conversations.len());
        self.replace(conversations);
        Ok(&self.conversations)
    }

    /// Existing 1-on-1 conversation between the current user and
    /// `participant_id`, if any
    pub fn find_direct(&self, participant_id: i64) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.is_direct_with(self.current_user_id, participant_id))
    }

    /// Create a conversation, reusing an existing 1-on-1 instead of
    /// creating a duplicate
    pub async fn create(
        &mut self,
        api: &dyn ChatApi,
        participant_ids: Vec<i64>,
        is_group: bool,
        group_name: Option<String>,
    ) -> Result<Conversation> {
        if participant_ids.is_empty() {
            return Err(ChatError::Validation(
                "Select at least one participant".to_string(),
            ));
        }
        if participant_ids.iter().all(|id| *id == self.current_user_id) {
            return Err(ChatError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        if !is_group && participant_ids.len() == 1 {
            if let Some(existing) = self.find_direct(participant_ids[0]) {
                debug!(
                    "Reusing conversation {} with user {}",
                    existing.conversation_id, participant_ids[0]
                );
                return Ok(existing.clone());
            }
        }

        let request = CreateConversationRequest {
            participant_ids,
            is_group,
            group_name: if is_group { group_name } else { None },
        };
        let conversation = api.create_conversation(&request).await?;
        info!("Created conversation {}", conversation.conversation_id);

        self.conversations
            .retain(|c| c.conversation_id != conversation.conversation_id);
        self.conversations.insert(0, conversation.clone());
        Ok(conversation)
    }

    /// Zero the unread count locally, then tell the server.
    ///
    /// Idempotent. A failed server call is logged and otherwise ignored.
    pub async fn mark_read(&mut self, api: &dyn ChatApi, conversation_id: i64) {
        if let Some(conv) = self.get_mut(conversation_id) {
            conv.unread_count = 0;
        }
        if let Err(e) = api.mark_read(conversation_id).await {
            warn!("Failed to mark conversation {} as read: {}", conversation_id, e);
        }
    }

    /// Hide a conversation for the current user. The local entry is removed
    /// only after the server accepted the deletion.
    pub async fn delete(&mut self, api: &dyn ChatApi, conversation_id: i64) -> Result<()> {
        api.delete_conversation(conversation_id).await?;
        self.conversations
            .retain(|c| c.conversation_id != conversation_id);
        info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    /// Case-insensitive substring match over display names
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| {
                c.display_name(self.current_user_id)
                    .to_lowercase()
                    .contains(&needle)
            })
            .collect()
    }

    pub fn display_name(&self, conversation: &Conversation) -> String {
        conversation.display_name(self.current_user_id)
    }

    /// Apply a newly arrived message to the summaries.
    ///
    /// `is_open` suppresses the unread bump. Returns false when the
    /// conversation is not in the snapshot (caller should refresh).
    pub fn record_message(&mut self, message: &Message, is_open: bool) -> bool {
        let own = message.sender.user_id == self.current_user_id;
        let Some(pos) = self
            .conversations
            .iter()
            .position(|c| c.conversation_id == message.conversation_id)
        else {
            return false;
        };

        let mut conv = self.conversations.remove(pos);
        conv.last_message = Some(message.clone());
        if !is_open && !own {
            conv.unread_count += 1;
        }
        self.conversations.insert(0, conv);
        true
    }

    pub fn total_unread(&self) -> u64 {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }

    /// Number of conversations with something unread (badge count)
    pub fn unread_conversations(&self) -> usize {
        self.conversations
            .iter()
            .filter(|c| c.unread_count > 0)
            .count()
    }
}
