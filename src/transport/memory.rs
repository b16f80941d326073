//! In-process broker for tests and development loopback
//!
//! Implements the substrate semantics the agent relies on: exact-topic
//! routing, retained-message replay on subscribe, and last-will delivery
//! when a client is severed without a clean shutdown.

use super::traits::{Publisher, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use homelink_shared::wire::{LastWill, Qos};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct BrokerState {
    retained: HashMap<String, Bytes>,
    subscriptions: Vec<Subscription>,
    clients: HashMap<String, ClientState>,
}

struct Subscription {
    client_id: String,
    topic: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

struct ClientState {
    will: Option<LastWill>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

/// An in-process pub/sub broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client, replacing any previous session under the same id.
    /// The optional last will is held until the client disconnects.
    pub fn connect(&self, client_id: &str, will: Option<LastWill>) -> MemoryTransport {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut state = self.lock();
        state.clients.insert(
            client_id.to_string(),
            ClientState {
                will,
                event_tx: event_tx.clone(),
            },
        );
        drop(state);

        let _ = event_tx.send(TransportEvent::Connected);

        MemoryTransport {
            broker: self.clone(),
            client_id: client_id.to_string(),
            event_rx,
        }
    }

    /// Drop a client ungracefully: its channels close and its last will
    /// is published by the broker, exactly as a real substrate would on
    /// connection loss
    pub fn sever(&self, client_id: &str) {
        let (client, will) = {
            let mut state = self.lock();
            state
                .subscriptions
                .retain(|sub| sub.client_id != client_id);
            let client = state.clients.remove(client_id);
            let will = client.as_ref().and_then(|c| c.will.clone());
            (client, will)
        };
        drop(client);

        if let Some(will) = will {
            self.route(&will.topic, Bytes::from(will.payload), will.retain);
        }
    }

    /// Detach a client cleanly; the last will is discarded, not fired
    pub fn disconnect(&self, client_id: &str) {
        let mut state = self.lock();
        state
            .subscriptions
            .retain(|sub| sub.client_id != client_id);
        state.clients.remove(client_id);
    }

    /// Current retained payload for a topic, if any
    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.lock().retained.get(topic).cloned()
    }

    fn subscribe(&self, client_id: &str, topic: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        let client = state
            .clients
            .get(client_id)
            .ok_or(TransportError::ChannelClosed)?;
        let tx = client.event_tx.clone();

        // New subscribers immediately see the retained value
        if let Some(payload) = state.retained.get(topic) {
            let _ = tx.send(TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
        }

        state.subscriptions.push(Subscription {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            tx,
        });
        Ok(())
    }

    fn route(&self, topic: &str, payload: Bytes, retain: bool) {
        let mut state = self.lock();
        if retain {
            state.retained.insert(topic.to_string(), payload.clone());
        }
        state.subscriptions.retain(|sub| {
            if sub.topic != topic {
                return true;
            }
            sub.tx
                .send(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        // Broker state is plain data; a poisoned lock means a panic in
        // another test thread and the state is still safe to read.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Publish handle for a [`MemoryBroker`]
#[derive(Clone)]
pub struct MemoryPublisher {
    broker: MemoryBroker,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        _qos: Qos,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.broker.route(topic, payload, retain);
        Ok(())
    }
}

/// One client's view of a [`MemoryBroker`]
pub struct MemoryTransport {
    broker: MemoryBroker,
    client_id: String,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl Transport for MemoryTransport {
    type Publisher = MemoryPublisher;

    fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            broker: self.broker.clone(),
        }
    }

    async fn subscribe(&self, topic: &str, _qos: Qos) -> Result<(), TransportError> {
        self.broker.subscribe(&self.client_id, topic)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_message(transport: &mut MemoryTransport) -> (String, Bytes) {
        loop {
            match transport.recv().await {
                Some(TransportEvent::Message { topic, payload }) => return (topic, payload),
                Some(_) => continue,
                None => panic!("transport closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_routes_to_subscriber() {
        let broker = MemoryBroker::new();
        let mut sub = broker.connect("sub", None);
        sub.subscribe("home/office/deskpc/rpc/req", Qos::AtLeastOnce)
            .await
            .expect("subscribe");

        let publisher = broker.connect("pub", None).publisher();
        publisher
            .publish(
                "home/office/deskpc/rpc/req",
                Bytes::from_static(b"{}"),
                Qos::AtLeastOnce,
                false,
            )
            .await
            .expect("publish");

        let (topic, payload) = next_message(&mut sub).await;
        assert_eq!(topic, "home/office/deskpc/rpc/req");
        assert_eq!(payload, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_no_delivery_for_other_topics() {
        let broker = MemoryBroker::new();
        let mut sub = broker.connect("sub", None);
        sub.subscribe("a", Qos::AtMostOnce).await.expect("subscribe");
        assert!(matches!(sub.recv().await, Some(TransportEvent::Connected)));

        let publisher = sub.publisher();
        publisher
            .publish("b", Bytes::from_static(b"x"), Qos::AtMostOnce, false)
            .await
            .expect("publish");
        publisher
            .publish("a", Bytes::from_static(b"y"), Qos::AtMostOnce, false)
            .await
            .expect("publish");

        let (topic, payload) = next_message(&mut sub).await;
        assert_eq!(topic, "a");
        assert_eq!(payload, Bytes::from_static(b"y"));
    }

    #[tokio::test]
    async fn test_retained_replayed_on_subscribe() {
        let broker = MemoryBroker::new();
        let publisher = broker.connect("pub", None).publisher();
        publisher
            .publish("status", Bytes::from_static(b"online"), Qos::AtMostOnce, true)
            .await
            .expect("publish");

        // Late subscriber still sees the retained value
        let mut sub = broker.connect("sub", None);
        sub.subscribe("status", Qos::AtMostOnce).await.expect("subscribe");

        let (topic, payload) = next_message(&mut sub).await;
        assert_eq!(topic, "status");
        assert_eq!(payload, Bytes::from_static(b"online"));
    }

    #[tokio::test]
    async fn test_sever_fires_last_will() {
        let broker = MemoryBroker::new();
        let mut observer = broker.connect("observer", None);
        observer
            .subscribe("home/office/deskpc/status", Qos::AtMostOnce)
            .await
            .expect("subscribe");

        let will = LastWill {
            topic: "home/office/deskpc/status".into(),
            payload: b"offline".to_vec(),
            retain: true,
        };
        let mut agent = broker.connect("agent", Some(will));

        broker.sever("agent");

        let (_, payload) = next_message(&mut observer).await;
        assert_eq!(payload, Bytes::from_static(b"offline"));
        assert_eq!(
            broker.retained("home/office/deskpc/status"),
            Some(Bytes::from_static(b"offline"))
        );
        // The severed client's event stream ends
        loop {
            match agent.recv().await {
                Some(_) => continue,
                None => break,
            }
        }
    }

    #[tokio::test]
    async fn test_clean_disconnect_keeps_will_quiet() {
        let broker = MemoryBroker::new();
        let observer = broker.connect("observer", None);
        observer
            .subscribe("status", Qos::AtMostOnce)
            .await
            .expect("subscribe");

        let will = LastWill {
            topic: "status".into(),
            payload: b"offline".to_vec(),
            retain: true,
        };
        broker.connect("agent", Some(will));
        broker.disconnect("agent");

        assert_eq!(broker.retained("status"), None);
    }
}
