/// WebSocket broker client
use crate::error::{ChatError, Result};
use crate::transport::frame::{Command, Frame};
use crate::transport::{Delivery, DeliveryReceiver, Subscription, Transport};
use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

/// Broker connection over a single WebSocket.
///
/// Reading and writing run in two spawned tasks; this handle only talks to
/// them through channels, so it can be shared behind an `Arc`.
pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    connected: Arc<AtomicBool>,
    next_subscription: AtomicU64,
}

impl WsTransport {
    /// Open the connection and complete the broker handshake.
    ///
    /// The bearer credential is attached both to the HTTP upgrade request and
    /// to the CONNECT frame. No retry on failure.
    pub async fn connect(
        url: &str,
        credential: &str,
        connect_timeout: Duration,
    ) -> Result<(Self, DeliveryReceiver)> {
        let mut request = url.into_client_request()?;
        if !credential.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", credential))
                .map_err(|e| ChatError::Config(format!("Invalid credential: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let host = request.uri().host().unwrap_or("localhost").to_string();

        let (ws_stream, _) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| ChatError::Network(format!("Connection timeout to {}", url)))??;
        debug!("WebSocket established to {}", url);

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        ws_tx
            .send(WsMessage::text(Frame::connect(&host, credential).encode()))
            .await?;

        let connected_frame = timeout(connect_timeout, wait_connected(&mut ws_rx))
            .await
            .map_err(|_| ChatError::Network("Broker handshake timeout".to_string()))??;
        info!(
            "Connected to broker at {} (version {})",
            url,
            connected_frame.get("version").unwrap_or("?")
        );

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let writer_flag = connected.clone();
        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = ws_tx.send(message).await {
                    error!("Failed to write to broker: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_flag.store(false, Ordering::SeqCst);
        });

        let reader_flag = connected.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(WsMessage::Text(text)) => {
                        if !route_frame(text.as_str(), &delivery_tx) {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        debug!("Broker sent close");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Broker connection error: {}", e);
                        break;
                    }
                }
            }
            reader_flag.store(false, Ordering::SeqCst);
            info!("Broker connection closed");
        });

        Ok((
            Self {
                outgoing: out_tx,
                connected,
                next_subscription: AtomicU64::new(0),
            },
            delivery_rx,
        ))
    }

    fn send_frame(&self, frame: Frame) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.outgoing.send(WsMessage::text(frame.encode())).is_err() {
            self.connected.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let id = format!("sub-{}", self.next_subscription.fetch_add(1, Ordering::SeqCst));
        if !self.send_frame(Frame::subscribe(&id, topic)) {
            return Err(ChatError::Transport(format!(
                "Cannot subscribe to {}: not connected",
                topic
            )));
        }
        debug!("Subscribed {} to {}", id, topic);
        Ok(Subscription {
            id,
            topic: topic.to_string(),
        })
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        if self.send_frame(Frame::unsubscribe(&subscription.id)) {
            debug!("Unsubscribed {} from {}", subscription.id, subscription.topic);
        }
        Ok(())
    }

    async fn publish(&self, destination: &str, payload: &str) -> Result<()> {
        if !self.send_frame(Frame::send(destination, payload)) {
            debug!("Dropping publish to {}: not connected", destination);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.send_frame(Frame::new(Command::Disconnect)) {
            if self.outgoing.send(WsMessage::Close(None)).is_err() {
                debug!("Writer already stopped, skipping close");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from broker");
        Ok(())
    }
}

async fn wait_connected<S>(rx: &mut S) -> Result<Frame>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(result) = rx.next().await {
        let text = match result? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        let Some(frame) = Frame::decode(text.as_str())? else {
            continue;
        };
        match frame.command {
            Command::Connected => return Ok(frame),
            Command::Error => {
                let reason = frame.get("message").unwrap_or("rejected").to_string();
                return Err(ChatError::Auth(format!("Broker refused connection: {}", reason)));
            }
            other => warn!("Unexpected {} frame during handshake", other),
        }
    }
    Err(ChatError::Transport(
        "Connection closed during handshake".to_string(),
    ))
}

/// Forward a MESSAGE frame to the delivery channel. Returns false once the
/// receiving side is gone.
fn route_frame(text: &str, deliveries: &mpsc::UnboundedSender<Delivery>) -> bool {
    let frame = match Frame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return true,
        Err(e) => {
            warn!("Discarding malformed broker frame: {}", e);
            return true;
        }
    };

    match frame.command {
        Command::Message => {
            let (Some(subscription_id), Some(destination)) =
                (frame.get("subscription"), frame.get("destination"))
            else {
                warn!("MESSAGE frame without subscription or destination");
                return true;
            };
            let delivery = Delivery {
                subscription_id: subscription_id.to_string(),
                destination: destination.to_string(),
                body: frame.body.clone(),
            };
            deliveries.send(delivery).is_ok()
        }
        Command::Error => {
            error!(
                "Broker error: {} {}",
                frame.get("message").unwrap_or(""),
                frame.body
            );
            true
        }
        Command::Receipt => true,
        other => {
            debug!("Ignoring {} frame", other);
            true
        }
    }
}
