//! Presence state and heartbeat emission
//!
//! The agent only ever publishes `online`. The retained `offline` flag on
//! the status topic is the broker's last-will obligation, configured at
//! connect time, so presence stays correct even when the process dies
//! without running any cleanup.

use crate::transport::Publisher;
use bytes::Bytes;
use homelink_shared::envelope::Heartbeat;
use homelink_shared::topic::{TopicSet, STATUS_ONLINE};
use homelink_shared::wire::Qos;
use homelink_shared::{now_ms, now_secs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Connection status as seen by the presence manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Online,
}

/// Presence bookkeeping owned by the manager
#[derive(Debug, Clone)]
pub struct PresenceState {
    pub status: Status,
    pub last_heartbeat_ms: u64,
}

/// Maintains the online flag and emits retained heartbeats on a timer
pub struct PresenceManager<P: Publisher> {
    state: Arc<RwLock<PresenceState>>,
    publisher: P,
    topics: TopicSet,
    heartbeat_interval: Duration,
}

impl<P: Publisher + Clone + 'static> PresenceManager<P> {
    pub fn new(publisher: P, topics: TopicSet, heartbeat_interval: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(PresenceState {
                status: Status::Disconnected,
                last_heartbeat_ms: 0,
            })),
            publisher,
            topics,
            heartbeat_interval,
        }
    }

    pub async fn status(&self) -> Status {
        self.state.read().await.status
    }

    /// Transition to online and publish the retained status flag
    pub async fn mark_online(&self) {
        self.state.write().await.status = Status::Online;
        info!(topic = %self.topics.status, "presence online");

        let payload = Bytes::from_static(STATUS_ONLINE.as_bytes());
        if let Err(e) = self
            .publisher
            .publish(&self.topics.status, payload, Qos::AtMostOnce, true)
            .await
        {
            warn!(error = %e, "failed to publish online status");
        }
    }

    /// Record loss of the session. The retained `offline` flag is
    /// delivered by the broker's last will, not from here.
    pub async fn mark_disconnected(&self) {
        self.state.write().await.status = Status::Disconnected;
    }

    /// Start the heartbeat loop as an independent task so a stuck
    /// command handler cannot stall the cadence
    pub fn start_heartbeat(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        let publisher = self.publisher.clone();
        let topic = self.topics.heartbeat.clone();
        let period = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                if state.read().await.status != Status::Online {
                    continue;
                }

                let heartbeat = Heartbeat { ts: now_secs() };
                let payload = match serde_json::to_vec(&heartbeat) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "heartbeat encode failed");
                        continue;
                    }
                };

                match publisher
                    .publish(&topic, Bytes::from(payload), Qos::AtMostOnce, true)
                    .await
                {
                    Ok(()) => {
                        state.write().await.last_heartbeat_ms = now_ms();
                        debug!(ts = heartbeat.ts, "heartbeat published");
                    }
                    Err(e) => warn!(error = %e, "heartbeat publish failed"),
                }
            }
        })
    }
}
