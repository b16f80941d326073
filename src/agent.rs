//! Agent wiring: subscription, presence, and the inbound event loop

use crate::command::{CommandRegistry, Dispatcher};
use crate::config::AgentConfig;
use crate::presence::PresenceManager;
use crate::transport::{Transport, TransportEvent};
use homelink_shared::topic::TopicSet;
use homelink_shared::wire::Qos;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run the agent event loop until the transport shuts down for good.
pub async fn run<T: Transport>(
    config: AgentConfig,
    topics: TopicSet,
    registry: CommandRegistry,
    mut transport: T,
) -> anyhow::Result<()> {
    transport.subscribe(&topics.request, Qos::AtLeastOnce).await?;

    let publisher = transport.publisher();
    let presence = PresenceManager::new(publisher.clone(), topics.clone(), config.heartbeat_interval);
    let _heartbeat = presence.start_heartbeat();

    let dispatcher = Arc::new(Dispatcher::new(registry, publisher, topics, &config));

    while let Some(event) = transport.recv().await {
        match event {
            TransportEvent::Connected => {
                info!("session established");
                presence.mark_online().await;
            }
            TransportEvent::Disconnected { reason } => {
                warn!(reason = %reason, "session lost");
                presence.mark_disconnected().await;
            }
            TransportEvent::Message { topic, payload } => {
                debug!(topic = %topic, len = payload.len(), "request received");

                // Each request runs in its own task so a slow handler
                // cannot stall the event loop or the heartbeat cadence.
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.handle(payload).await {
                        error!(error = %e, "request handling failed");
                    }
                });
            }
        }
    }

    error!("transport closed");
    Ok(())
}
