/// Real-time transport: one persistent broker connection per chat session
pub mod frame;
pub mod loopback;
pub mod ws;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use frame::{Command, Frame};
pub use loopback::LoopbackTransport;
pub use ws::WsTransport;

/// Destination for outgoing chat messages
pub const SEND_DESTINATION: &str = "/app/chat.send";
/// Destination for outgoing typing notices
pub const TYPING_DESTINATION: &str = "/app/chat.typing";

/// Handle for one subscription. Revoke with [`Transport::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub id: String,
    pub topic: String,
}

/// A broadcast routed to one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub subscription_id: String,
    pub destination: String,
    pub body: String,
}

pub type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

/// Broker connection shared (subscribe/publish only) by the chat components
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to a topic; each call yields an independently revocable handle
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<()>;

    /// Publish a JSON payload. Dropped (not buffered) while disconnected.
    async fn publish(&self, destination: &str, payload: &str) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the connection. Only session teardown calls this.
    async fn disconnect(&self) -> Result<()>;
}

/// What a per-conversation topic carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Messages,
    Typing,
    Reactions,
    Edits,
    Deletions,
}

impl TopicKind {
    pub const ALL: [TopicKind; 5] = [
        TopicKind::Messages,
        TopicKind::Typing,
        TopicKind::Reactions,
        TopicKind::Edits,
        TopicKind::Deletions,
    ];

    pub fn topic(&self, conversation_id: i64) -> String {
        let base = format!("/topic/conversation/{}", conversation_id);
        match self {
            TopicKind::Messages => base,
            TopicKind::Typing => format!("{}/typing", base),
            TopicKind::Reactions => format!("{}/reaction", base),
            TopicKind::Edits => format!("{}/edit", base),
            TopicKind::Deletions => format!("{}/delete", base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(TopicKind::Messages.topic(3), "/topic/conversation/3");
        assert_eq!(TopicKind::Typing.topic(3), "/topic/conversation/3/typing");
        assert_eq!(TopicKind::Deletions.topic(3), "/topic/conversation/3/delete");
    }
}
