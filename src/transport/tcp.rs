//! TCP bridge transport with persistent connection and automatic reconnection
//!
//! Speaks the length-prefixed frame protocol of `homelink-shared` to a
//! broker bridge. The background connection loop owns reconnect policy;
//! the broker side owns last-will delivery when this process dies.

use super::traits::{Publisher, Transport, TransportError, TransportEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use homelink_shared::codec::{self, FrameDecoder};
use homelink_shared::timing;
use homelink_shared::wire::{Frame, LastWill, Qos};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for the bridge connection
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge address in `host:port` form
    pub address: String,
    /// Client identity presented at connect time
    pub client_id: String,
    /// Auth user, if the bridge requires one
    pub user: Option<String>,
    /// Auth secret, if the bridge requires one
    pub secret: Option<String>,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:1883".into(),
            client_id: "pc-deskpc".into(),
            user: None,
            secret: None,
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(timing::MAX_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
        }
    }
}

type SubscriptionMap = Arc<Mutex<HashMap<String, Qos>>>;

/// Cloneable publish handle backed by the outbound frame channel
#[derive(Clone)]
pub struct BridgePublisher {
    outbound_tx: mpsc::Sender<Frame>,
}

#[async_trait]
impl Publisher for BridgePublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.outbound_tx
            .send(Frame::Publish {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Persistent connection to the broker bridge
pub struct BridgeTransport {
    outbound_tx: mpsc::Sender<Frame>,
    event_rx: mpsc::Receiver<TransportEvent>,
    subscriptions: SubscriptionMap,
}

impl BridgeTransport {
    /// Start the background connection loop and return the transport.
    /// The last will is registered with the bridge on every (re)connect.
    pub fn connect(config: BridgeConfig, will: LastWill) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(100);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(100);
        let subscriptions: SubscriptionMap = Arc::new(Mutex::new(HashMap::new()));

        let subs_clone = subscriptions.clone();
        tokio::spawn(async move {
            connection_loop(config, will, subs_clone, outbound_rx, event_tx).await;
        });

        Self {
            outbound_tx,
            event_rx,
            subscriptions,
        }
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    type Publisher = BridgePublisher;

    fn publisher(&self) -> BridgePublisher {
        BridgePublisher {
            outbound_tx: self.outbound_tx.clone(),
        }
    }

    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .await
            .insert(topic.to_string(), qos);
        self.outbound_tx
            .send(Frame::Subscribe {
                topic: topic.to_string(),
                qos,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.event_rx.recv().await
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: BridgeConfig,
    will: LastWill,
    subscriptions: SubscriptionMap,
    mut outbound_rx: mpsc::Receiver<Frame>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(config.connect_timeout, TcpStream::connect(&config.address)).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;

                if let Err(reason) = handle_connection(
                    stream,
                    &config,
                    &will,
                    &subscriptions,
                    &mut outbound_rx,
                    &event_tx,
                )
                .await
                {
                    let sent = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: reason.to_string(),
                        })
                        .await;
                    if sent.is_err() {
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(address = %config.address, error = %e, "bridge connect failed");
            }
            Err(_) => {
                warn!(address = %config.address, "bridge connect timed out");
            }
        }

        tokio::time::sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Handle an active connection: handshake, subscription replay, then the
/// read/write loop
async fn handle_connection(
    stream: TcpStream,
    config: &BridgeConfig,
    will: &LastWill,
    subscriptions: &SubscriptionMap,
    outbound_rx: &mut mpsc::Receiver<Frame>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let connect = Frame::Connect {
        client_id: config.client_id.clone(),
        user: config.user.clone(),
        secret: config.secret.clone(),
        will: Some(will.clone()),
    };
    writer.write_all(&codec::encode(&connect)?).await?;

    // Subscriptions from earlier sessions must survive the reconnect
    for (topic, qos) in subscriptions.lock().await.iter() {
        let frame = Frame::Subscribe {
            topic: topic.clone(),
            qos: *qos,
        };
        writer.write_all(&codec::encode(&frame)?).await?;
    }

    info!(address = %config.address, client_id = %config.client_id, "bridge session established");
    let _ = event_tx.send(TransportEvent::Connected).await;

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            Some(frame) = outbound_rx.recv() => {
                writer.write_all(&codec::encode(&frame)?).await?;
            }

            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        return Err(anyhow!("bridge closed connection"));
                    }
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);

                        while let Some(frame) = decoder.decode_next()? {
                            match frame {
                                Frame::Message { topic, payload } => {
                                    let _ = event_tx
                                        .send(TransportEvent::Message {
                                            topic,
                                            payload: Bytes::from(payload),
                                        })
                                        .await;
                                }
                                other => {
                                    debug!(?other, "ignoring unexpected frame from bridge");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        return Err(anyhow!("read error: {e}"));
                    }
                }
            }
        }
    }
}
