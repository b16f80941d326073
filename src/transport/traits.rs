//! Transport trait abstraction over the pub/sub substrate

use async_trait::async_trait;
use bytes::Bytes;
use homelink_shared::wire::Qos;
use std::time::Duration;
use thiserror::Error;

/// Errors crossing the transport boundary.
///
/// These are not recoverable at the request level; the connection loop
/// owns reconnection and the broker's last will owns the observable
/// offline transition.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection task has shut down and the channel is closed
    #[error("transport channel closed")]
    ChannelClosed,

    /// A publish did not complete within the configured bound
    #[error("publish timed out after {0:?}")]
    PublishTimeout(Duration),
}

/// Events emitted by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session with the broker established
    Connected,
    /// Session lost; the broker delivers the last will on our behalf
    Disconnected { reason: String },
    /// Inbound message on a subscribed topic
    Message { topic: String, payload: Bytes },
}

/// Cloneable handle for publishing to the substrate, safe to share
/// between the dispatcher and the presence manager
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError>;
}

/// A connection to the pub/sub substrate
#[async_trait]
pub trait Transport: Send {
    type Publisher: Publisher + Clone + Send + Sync + 'static;

    /// Get a publish handle for this connection
    fn publisher(&self) -> Self::Publisher;

    /// Register interest in a topic; the transport re-applies
    /// subscriptions after a reconnect
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), TransportError>;

    /// Receive the next transport event; `None` when the transport has
    /// shut down for good
    async fn recv(&mut self) -> Option<TransportEvent>;
}
