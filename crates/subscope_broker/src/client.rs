//! Broker client capability and its WebSocket implementation.
//!
//! The `BrokerClient` trait is the seam the rest of the tool is written
//! against; tests substitute channel-backed mocks. `WsBrokerClient` is the
//! real implementation: one writer task owns the WebSocket sink, one reader
//! task turns inbound `message` frames into [`InboundMessage`] values pushed
//! onto the channel supplied at construction.
//!
//! Connect is bounded by a 5 second timeout so a dead endpoint surfaces as an
//! error instead of a hang. Subscribe/publish enqueue onto the writer task
//! and never block the caller.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use std::time::Duration;

use crate::error::BrokerError;
use crate::message::{ApplicationMessage, InboundMessage, QoS};
use crate::wire::{ClientFrame, ServerFrame};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS material for a secured broker connection.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub ca_cert: String,
    pub client_cert: String,
    pub private_key: String,
}

/// The opaque broker capability the inspector is written against.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn connect(&self, endpoint: &str, tls: Option<TlsConfig>) -> Result<(), BrokerError>;
    async fn disconnect(&self) -> Result<(), BrokerError>;
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BrokerError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;
    async fn publish(&self, message: &ApplicationMessage) -> Result<(), BrokerError>;
}

struct Connection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// WebSocket implementation of [`BrokerClient`].
pub struct WsBrokerClient {
    inbound: mpsc::UnboundedSender<InboundMessage>,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl WsBrokerClient {
    /// Create a client. Inbound messages are pushed onto `inbound` for the
    /// ingestion pipeline to consume.
    pub fn new(inbound: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self {
            inbound,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), BrokerError> {
        let conn = self.conn.lock().await;
        let conn = conn.as_ref().ok_or(BrokerError::NotConnected)?;
        let text = serde_json::to_string(frame).map_err(|e| BrokerError::Encode(e.to_string()))?;
        conn.outbound
            .send(WsMessage::text(text))
            .map_err(|_| BrokerError::ChannelClosed)
    }
}

#[async_trait]
impl BrokerClient for WsBrokerClient {
    async fn connect(&self, endpoint: &str, tls: Option<TlsConfig>) -> Result<(), BrokerError> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Err(BrokerError::AlreadyConnected);
        }
        if tls.is_some() {
            return Err(BrokerError::TlsUnsupported);
        }

        let url = format!("ws://{endpoint}");
        let connected = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| BrokerError::Timeout {
                endpoint: endpoint.to_string(),
            })?;
        let (ws_stream, _response) = connected.map_err(|e| BrokerError::Handshake {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        debug!("WebSocket connection established with {endpoint}");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send frame to broker: {e}");
                    break;
                }
            }
        });

        let inbound = self.inbound.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_receiver.next().await {
                if !msg.is_text() {
                    continue;
                }
                let text = match msg.to_text() {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                match serde_json::from_str::<ServerFrame>(text) {
                    Ok(ServerFrame::Message {
                        topic,
                        payload,
                        qos,
                        ..
                    }) => {
                        let delivered = InboundMessage {
                            topic,
                            payload: payload.into_bytes(),
                            qos: QoS::from_code(qos).unwrap_or(QoS::AtMostOnce),
                        };
                        if inbound.send(delivered).is_err() {
                            break;
                        }
                    }
                    Ok(ServerFrame::Error { message }) => {
                        warn!("Broker reported an error: {message}");
                    }
                    Err(e) => {
                        warn!(
                            "Invalid frame from broker: {e} | {}",
                            &text.chars().take(100).collect::<String>()
                        );
                    }
                }
            }
        });

        *conn = Some(Connection {
            outbound: tx,
            reader,
            writer,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn.lock().await;
        let conn = conn.take().ok_or(BrokerError::NotConnected)?;
        // Best-effort close frame; the writer exits once the channel drains.
        let _ = conn.outbound.send(WsMessage::Close(None));
        drop(conn.outbound);
        conn.reader.abort();
        let _ = conn.writer.await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BrokerError> {
        self.send_frame(&ClientFrame::Subscribe {
            topic: topic.to_string(),
            qos: qos.code(),
        })
        .await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.send_frame(&ClientFrame::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }

    async fn publish(&self, message: &ApplicationMessage) -> Result<(), BrokerError> {
        self.send_frame(&ClientFrame::Publish {
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            message_id: Some(uuid::Uuid::new_v4().to_string()),
            qos: Some(message.qos.code()),
            retain: Some(message.retain),
        })
        .await
    }
}
