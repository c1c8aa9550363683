/// In-process broker with the same contract as the WebSocket client
use crate::error::{ChatError, Result};
use crate::transport::{Delivery, DeliveryReceiver, Subscription, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// A payload accepted by [`LoopbackTransport::publish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub destination: String,
    pub payload: String,
}

#[derive(Default)]
struct LoopbackState {
    subscriptions: Vec<Subscription>,
    published: Vec<Published>,
    next_id: u64,
}

/// Broker stand-in: records publishes and lets the caller play the server
/// side by broadcasting to whoever is subscribed to a topic.
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    connected: AtomicBool,
}

impl LoopbackTransport {
    pub fn new() -> (Self, DeliveryReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Mutex::new(LoopbackState::default()),
                deliveries: tx,
                connected: AtomicBool::new(true),
            },
            rx,
        )
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }

    /// Payloads published to one destination, in order
    pub fn published_to(&self, destination: &str) -> Vec<String> {
        self.state()
            .published
            .iter()
            .filter(|p| p.destination == destination)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Topics with at least one live subscription
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .state()
            .subscriptions
            .iter()
            .map(|s| s.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Deliver `body` to every current subscriber of `topic`.
    /// Returns the number of deliveries made.
    pub fn broadcast(&self, topic: &str, body: &str) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for sub in state.subscriptions.iter().filter(|s| s.topic == topic) {
            let delivery = Delivery {
                subscription_id: sub.id.clone(),
                destination: topic.to_string(),
                body: body.to_string(),
            };
            if self.deliveries.send(delivery).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(ChatError::Transport(format!(
                "Cannot subscribe to {}: not connected",
                topic
            )));
        }
        let mut state = self.state();
        let subscription = Subscription {
            id: format!("sub-{}", state.next_id),
            topic: topic.to_string(),
        };
        state.next_id += 1;
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        self.state().subscriptions.retain(|s| s.id != subscription.id);
        Ok(())
    }

    async fn publish(&self, destination: &str, payload: &str) -> Result<()> {
        if !self.is_connected() {
            debug!("Dropping publish to {}: not connected", destination);
            return Ok(());
        }
        self.state().published.push(Published {
            destination: destination.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        self.set_connected(false);
        self.state().subscriptions.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriptions_are_independent() {
        let (transport, mut rx) = LoopbackTransport::new();
        let a = transport.subscribe("/topic/t").await.unwrap();
        let b = transport.subscribe("/topic/t").await.unwrap();
        assert_ne!(a.id, b.id);

        transport.unsubscribe(&a).await.unwrap();
        assert_eq!(transport.broadcast("/topic/t", "x"), 1);
        assert_eq!(rx.recv().await.unwrap().subscription_id, b.id);
    }

    #[tokio::test]
    async fn test_publish_dropped_while_disconnected() {
        let (transport, _rx) = LoopbackTransport::new();
        transport.set_connected(false);
        transport.publish("/app/chat.send", "{}").await.unwrap();
        transport.set_connected(true);
        transport.publish("/app/chat.send", "{}").await.unwrap();
        assert_eq!(transport.published().len(), 1);
    }
}
