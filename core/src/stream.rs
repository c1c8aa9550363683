/// Message stream for the open conversation: history pages merged with live
/// broadcasts and optimistic placeholders
use crate::model::{Message, MessageId, MessagePage, Reactions, UserSummary};
use crate::reactions::{self, Toggle};
use tracing::debug;

/// Lifecycle of the open conversation's history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Loading,
    Ready,
}

/// Identifies one history fetch. A ticket goes stale as soon as another
/// conversation is opened (or the same one is reopened).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub conversation_id: i64,
    generation: u64,
}

/// What happened to an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New entry at the end of the list
    Appended,
    /// Same id already present; dropped
    Duplicate,
    /// Replaced a pending placeholder with the same content and sender
    Reconciled,
    /// Belongs to another conversation; dropped
    Foreign,
}

pub struct MessageStream {
    conversation_id: Option<i64>,
    state: StreamState,
    generation: u64,
    /// Chronological, oldest first
    messages: Vec<Message>,
    next_page: u32,
    has_more: bool,
}

impl Default for MessageStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStream {
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            state: StreamState::Idle,
            generation: 0,
            messages: Vec::new(),
            next_page: 0,
            has_more: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Placeholders still waiting for their server copy
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.id.is_local()).count()
    }

    /// Switch to `conversation_id` and enter Loading. Any earlier ticket
    /// becomes stale.
    pub fn begin_load(&mut self, conversation_id: i64) -> LoadTicket {
        self.generation += 1;
        self.conversation_id = Some(conversation_id);
        self.state = StreamState::Loading;
        self.messages.clear();
        self.next_page = 0;
        self.has_more = false;
        LoadTicket {
            conversation_id,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation && self.conversation_id == Some(ticket.conversation_id)
    }

    /// Install the first history page (newest-first on the wire) and enter
    /// Ready. Live messages that arrived while loading are kept after the
    /// history. Returns false for a stale ticket.
    pub fn finish_load(&mut self, ticket: LoadTicket, page: MessagePage) -> bool {
        if !self.is_current(ticket) {
            debug!(
                "Discarding stale history for conversation {}",
                ticket.conversation_id
            );
            return false;
        }

        let live = std::mem::take(&mut self.messages);
        let mut history = page.content;
        history.reverse();
        self.messages = history;
        for message in live {
            self.merge_incoming(message);
        }

        self.next_page = page.number + 1;
        self.has_more = !page.last;
        self.state = StreamState::Ready;
        true
    }

    /// History could not be fetched: show whatever is there (usually nothing)
    pub fn fail_load(&mut self, ticket: LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.has_more = false;
        self.state = StreamState::Ready;
        true
    }

    /// Page number to request for older history, if any remains
    pub fn begin_older(&self) -> Option<(LoadTicket, u32)> {
        let conversation_id = self.conversation_id?;
        if self.state != StreamState::Ready || !self.has_more {
            return None;
        }
        Some((
            LoadTicket {
                conversation_id,
                generation: self.generation,
            },
            self.next_page,
        ))
    }

    /// Prepend an older page, skipping ids already shown. Returns the number
    /// of messages added.
    pub fn finish_older(&mut self, ticket: LoadTicket, page: MessagePage) -> usize {
        if !self.is_current(ticket) {
            return 0;
        }
        let mut older: Vec<Message> = page
            .content
            .into_iter()
            .filter(|m| self.get(m.id).is_none())
            .collect();
        older.reverse();
        let added = older.len();
        older.append(&mut self.messages);
        self.messages = older;
        self.next_page = page.number + 1;
        self.has_more = !page.last;
        added
    }

    /// Return to Idle
    pub fn close(&mut self) {
        self.generation += 1;
        self.conversation_id = None;
        self.state = StreamState::Idle;
        self.messages.clear();
        self.next_page = 0;
        self.has_more = false;
    }

    /// Merge a live message.
    ///
    /// Id match drops the message. Otherwise the oldest pending placeholder
    /// with the same content and sender is replaced by it. Otherwise it is
    /// appended.
    pub fn merge_incoming(&mut self, message: Message) -> MergeOutcome {
        if self.conversation_id != Some(message.conversation_id) {
            return MergeOutcome::Foreign;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return MergeOutcome::Duplicate;
        }
        if !message.id.is_local() {
            let pending = self.messages.iter().position(|m| {
                m.id.is_local()
                    && m.sender.user_id == message.sender.user_id
                    && m.content == message.content
            });
            if let Some(pos) = pending {
                debug!("Reconciled placeholder {} as {}", self.messages[pos].id, message.id);
                self.messages[pos] = message;
                return MergeOutcome::Reconciled;
            }
        }
        self.messages.push(message);
        MergeOutcome::Appended
    }

    /// Append an optimistic copy of an outgoing message. None when no
    /// conversation is open.
    pub fn push_placeholder(&mut self, sender: UserSummary, content: String) -> Option<MessageId> {
        let conversation_id = self.conversation_id?;
        let placeholder = Message::placeholder(conversation_id, sender, content);
        let id = placeholder.id;
        self.messages.push(placeholder);
        Some(id)
    }

    /// Replace a message with its edited server copy
    pub fn apply_edit(&mut self, edited: Message) -> bool {
        match self.get_mut(edited.id) {
            Some(existing) => {
                *existing = edited;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(pos))
    }

    /// Overwrite a message's reactions with the server's view
    pub fn replace_reactions(&mut self, id: MessageId, reactions: Reactions) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.reactions = reactions;
                true
            }
            None => false,
        }
    }

    /// Local reaction toggle; None when the message is not shown
    pub fn toggle_reaction(&mut self, id: MessageId, emoji: &str, user_name: &str) -> Option<Toggle> {
        let message = self.get_mut(id)?;
        Some(reactions::toggle(&mut message.reactions, emoji, user_name))
    }
}
