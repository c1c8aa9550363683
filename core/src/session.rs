/// Chat session: owns the per-user state and drives the directory, message
/// stream and typing tracker from user actions and broker deliveries
use crate::api::ChatApi;
use crate::config::Config;
use crate::directory::ConversationDirectory;
use crate::error::{ChatError, Result};
use crate::events::ChatEvent;
use crate::model::{Conversation, Message, MessageId, MessageKind, SendMessageRequest, TypingEvent, UserSummary};
use crate::reactions::Toggle;
use crate::stream::{MergeOutcome, MessageStream};
use crate::transport::{
    Delivery, Subscription, TopicKind, Transport, SEND_DESTINATION, TYPING_DESTINATION,
};
use crate::typing::TypingTracker;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct ChatSession {
    user: UserSummary,
    config: Config,
    api: Arc<dyn ChatApi>,
    transport: Option<Arc<dyn Transport>>,
    directory: ConversationDirectory,
    stream: MessageStream,
    typing: TypingTracker,
    /// Topics of the open conversation; deliveries for anything else are dropped
    subscriptions: Vec<(Subscription, TopicKind)>,
}

impl ChatSession {
    pub fn new(config: Config, api: Arc<dyn ChatApi>) -> Self {
        let user = UserSummary {
            user_id: config.user.user_id,
            name: config.user.name.clone(),
            email: config.user.email.clone(),
        };
        Self {
            directory: ConversationDirectory::new(user.user_id),
            typing: TypingTracker::new(user.user_id, config.typing_debounce, config.typing_ttl),
            stream: MessageStream::new(),
            subscriptions: Vec::new(),
            transport: None,
            user,
            config,
            api,
        }
    }

    pub fn user(&self) -> &UserSummary {
        &self.user
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn stream(&self) -> &MessageStream {
        &self.stream
    }

    pub fn open_conversation_id(&self) -> Option<i64> {
        self.stream.conversation_id()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Topics currently subscribed for the open conversation
    pub fn active_topics(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .map(|(s, _)| s.topic.as_str())
            .collect()
    }

    pub fn typing_users(&self) -> Vec<String> {
        self.typing.typing_users()
    }

    pub fn next_typing_deadline(&self) -> Option<Instant> {
        self.typing.next_deadline()
    }

    /// Use `transport` for real-time traffic. An already open conversation is
    /// subscribed right away.
    pub async fn attach_transport(&mut self, transport: Arc<dyn Transport>) {
        // old handles belong to the old connection
        self.unsubscribe_all().await;
        self.transport = Some(transport);
        if let Some(conversation_id) = self.stream.conversation_id() {
            self.subscribe_topics(conversation_id).await;
        }
    }

    // ---- conversations ----

    pub fn conversations(&self) -> &[Conversation] {
        self.directory.list()
    }

    pub async fn refresh_conversations(&mut self) -> Result<()> {
        self.directory.refresh(self.api.as_ref()).await?;
        Ok(())
    }

    pub fn search_conversations(&self, query: &str) -> Vec<&Conversation> {
        self.directory.search(query)
    }

    pub async fn create_conversation(
        &mut self,
        participant_ids: Vec<i64>,
        is_group: bool,
        group_name: Option<String>,
    ) -> Result<Conversation> {
        self.directory
            .create(self.api.as_ref(), participant_ids, is_group, group_name)
            .await
    }

    /// Hide a conversation. Closes it first when it is the open one.
    pub async fn delete_conversation(&mut self, conversation_id: i64) -> Result<()> {
        self.directory
            .delete(self.api.as_ref(), conversation_id)
            .await?;
        if self.stream.conversation_id() == Some(conversation_id) {
            self.close_conversation().await;
        }
        Ok(())
    }

    // ---- open conversation ----

    /// Switch the message stream to `conversation_id`.
    ///
    /// The previous conversation's topics are revoked before the new ones are
    /// subscribed. Read state is reset once. A failed history fetch leaves
    /// the stream Ready and empty and is returned to the caller.
    pub async fn open_conversation(&mut self, conversation_id: i64) -> Result<()> {
        self.leave_current().await;

        let ticket = self.stream.begin_load(conversation_id);
        self.subscribe_topics(conversation_id).await;
        self.directory
            .mark_read(self.api.as_ref(), conversation_id)
            .await;

        match self
            .api
            .get_messages(conversation_id, 0, self.config.page_size)
            .await
        {
            Ok(page) => {
                if self.stream.finish_load(ticket, page) {
                    info!(
                        "Opened conversation {} ({} messages)",
                        conversation_id,
                        self.stream.messages().len()
                    );
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load history for {}: {}", conversation_id, e);
                self.stream.fail_load(ticket);
                Err(e)
            }
        }
    }

    pub async fn close_conversation(&mut self) {
        self.leave_current().await;
        self.stream.close();
    }

    /// Fetch the next older page. Returns the number of messages added.
    pub async fn load_older_messages(&mut self) -> Result<usize> {
        let Some((ticket, page_number)) = self.stream.begin_older() else {
            return Ok(0);
        };
        let page = self
            .api
            .get_messages(ticket.conversation_id, page_number, self.config.page_size)
            .await?;
        Ok(self.stream.finish_older(ticket, page))
    }

    /// Apply one broker delivery. Returns the event when it changed what is
    /// shown.
    pub async fn handle_delivery(&mut self, delivery: Delivery) -> Option<ChatEvent> {
        let Some(kind) = self
            .subscriptions
            .iter()
            .find(|(s, _)| s.id == delivery.subscription_id)
            .map(|(_, kind)| *kind)
        else {
            debug!(
                "Dropping delivery on {} for inactive subscription {}",
                delivery.destination, delivery.subscription_id
            );
            return None;
        };
        let conversation_id = self.stream.conversation_id()?;

        let event = match ChatEvent::decode(kind, conversation_id, &delivery.body) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring malformed event on {}: {}", delivery.destination, e);
                return None;
            }
        };

        let changed = match &event {
            ChatEvent::Message(message) => self.apply_live_message(message).await,
            ChatEvent::Typing(notice) => self.typing.apply_remote(notice, Instant::now()),
            ChatEvent::ReactionsChanged(message) => self
                .stream
                .replace_reactions(message.id, message.reactions.clone()),
            ChatEvent::Edited(message) => self.stream.apply_edit(message.clone()),
            ChatEvent::Deleted { message_id } => {
                self.stream.remove(MessageId::Server(*message_id)).is_some()
            }
        };

        changed.then_some(event)
    }

    async fn apply_live_message(&mut self, message: &Message) -> bool {
        match self.stream.merge_incoming(message.clone()) {
            MergeOutcome::Duplicate | MergeOutcome::Foreign => return false,
            MergeOutcome::Appended | MergeOutcome::Reconciled => {}
        }

        // only the open conversation is subscribed, so live messages never
        // count as unread here
        if !self.directory.record_message(message, true) {
            debug!(
                "Conversation {} not in directory, refreshing",
                message.conversation_id
            );
            if let Err(e) = self.directory.refresh(self.api.as_ref()).await {
                warn!("Failed to refresh conversations: {}", e);
            }
        }
        if message.sender.user_id != self.user.user_id {
            self.directory
                .mark_read(self.api.as_ref(), message.conversation_id)
                .await;
        }
        true
    }

    /// Send a text message to the open conversation.
    ///
    /// Whitespace-only input is ignored. The placeholder shown until the
    /// broadcast arrives is returned.
    pub async fn send_message(&mut self, content: &str) -> Result<Option<MessageId>> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        let Some(conversation_id) = self.stream.conversation_id() else {
            return Err(ChatError::Validation("No conversation is open".to_string()));
        };

        let placeholder = self
            .stream
            .push_placeholder(self.user.clone(), content.to_string());
        let request = SendMessageRequest {
            conversation_id,
            content: content.to_string(),
            kind: MessageKind::Text,
        };
        self.publish(SEND_DESTINATION, &request).await;
        self.stop_typing().await;
        Ok(placeholder)
    }

    /// Register a keystroke in the composer
    pub async fn on_input(&mut self) {
        let Some(conversation_id) = self.stream.conversation_id() else {
            return;
        };
        if self.typing.on_keystroke(Instant::now()) {
            self.publish_typing(conversation_id, true).await;
        }
    }

    /// Advance timers. Returns true when the visible typing set changed.
    pub async fn tick(&mut self, now: Instant) -> bool {
        if self.typing.poll(now) {
            if let Some(conversation_id) = self.stream.conversation_id() {
                self.publish_typing(conversation_id, false).await;
            }
        }
        self.typing.expire(now) > 0
    }

    /// Flip the current user's reaction on a message.
    ///
    /// Shown immediately. If the server rejects the toggle the local change
    /// is rolled back and the failure logged.
    pub async fn toggle_reaction(&mut self, message_id: MessageId, emoji: &str) -> Result<Option<Toggle>> {
        let Some(server_id) = message_id.server_id() else {
            return Err(ChatError::Validation(
                "Message has not been delivered yet".to_string(),
            ));
        };
        let name = self.user.name.clone();
        let Some(toggle) = self.stream.toggle_reaction(message_id, emoji, &name) else {
            return Err(ChatError::Validation(format!("Message {} is not shown", message_id)));
        };

        if let Err(e) = self.api.toggle_reaction(server_id, emoji).await {
            warn!("Reaction {} on message {} failed: {}", emoji, server_id, e);
            self.stream.toggle_reaction(message_id, emoji, &name);
            return Ok(None);
        }
        Ok(Some(toggle))
    }

    pub async fn edit_message(&mut self, message_id: MessageId, content: &str) -> Result<()> {
        let server_id = self.confirmed(message_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("Message cannot be empty".to_string()));
        }
        let edited = self.api.edit_message(server_id, content).await?;
        self.stream.apply_edit(edited);
        Ok(())
    }

    pub async fn delete_message(&mut self, message_id: MessageId) -> Result<()> {
        let server_id = self.confirmed(message_id)?;
        self.api.delete_message(server_id).await?;
        self.stream.remove(message_id);
        Ok(())
    }

    /// Server-side search within the open conversation
    pub async fn search_messages(&self, query: &str) -> Result<Vec<Message>> {
        let Some(conversation_id) = self.stream.conversation_id() else {
            return Err(ChatError::Validation("No conversation is open".to_string()));
        };
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.api.search_messages(conversation_id, query).await
    }

    /// Stop typing, revoke all topics and close the broker connection
    pub async fn teardown(&mut self) {
        self.close_conversation().await;
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.disconnect().await {
                warn!("Disconnect failed: {}", e);
            }
        }
        info!("Chat session closed");
    }

    // ---- internals ----

    fn confirmed(&self, message_id: MessageId) -> Result<i64> {
        message_id.server_id().ok_or_else(|| {
            ChatError::Validation("Message has not been delivered yet".to_string())
        })
    }

    async fn leave_current(&mut self) {
        if let Some(previous) = self.stream.conversation_id() {
            if self.typing.stop() {
                self.publish_typing(previous, false).await;
            }
        }
        self.unsubscribe_all().await;
        self.typing.clear_remote();
    }

    async fn stop_typing(&mut self) {
        if !self.typing.stop() {
            return;
        }
        if let Some(conversation_id) = self.stream.conversation_id() {
            self.publish_typing(conversation_id, false).await;
        }
    }

    async fn subscribe_topics(&mut self, conversation_id: i64) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        for kind in TopicKind::ALL {
            match transport.subscribe(&kind.topic(conversation_id)).await {
                Ok(subscription) => self.subscriptions.push((subscription, kind)),
                Err(e) => error!(
                    "Subscribe to {} failed: {}",
                    kind.topic(conversation_id),
                    e
                ),
            }
        }
    }

    async fn unsubscribe_all(&mut self) {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        for (subscription, _) in subscriptions {
            if let Err(e) = transport.unsubscribe(&subscription).await {
                debug!("Unsubscribe from {} failed: {}", subscription.topic, e);
            }
        }
    }

    async fn publish_typing(&self, conversation_id: i64, is_typing: bool) {
        let notice = TypingEvent {
            conversation_id,
            user_id: self.user.user_id,
            user_name: self.user.name.clone(),
            is_typing,
        };
        self.publish(TYPING_DESTINATION, &notice).await;
    }

    /// Fire-and-forget publish; dropped while disconnected
    async fn publish<T: Serialize + Sync>(&self, destination: &str, payload: &T) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.is_connected()) else {
            debug!("Not connected, dropping publish to {}", destination);
            return;
        };
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode payload for {}: {}", destination, e);
                return;
            }
        };
        if let Err(e) = transport.publish(destination, &body).await {
            warn!("Publish to {} failed: {}", destination, e);
        }
    }
}
