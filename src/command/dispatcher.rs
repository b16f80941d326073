//! Request dispatcher: decode, resolve, execute, answer
//!
//! Every inbound request produces exactly one published response, even
//! when decoding or resolution fails.

use super::handlers::HandlerContext;
use super::registry::CommandRegistry;
use crate::config::AgentConfig;
use crate::transport::{Publisher, TransportError};
use bytes::Bytes;
use homelink_shared::envelope::{self, ResponseEnvelope};
use homelink_shared::topic::TopicSet;
use homelink_shared::wire::Qos;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Consumes inbound request payloads and answers them
pub struct Dispatcher<P: Publisher> {
    registry: CommandRegistry,
    publisher: P,
    topics: TopicSet,
    device_id: String,
    handler_budget: Duration,
    publish_timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(
        registry: CommandRegistry,
        publisher: P,
        topics: TopicSet,
        config: &AgentConfig,
    ) -> Self {
        Self {
            registry,
            publisher,
            topics,
            device_id: config.device_id.clone(),
            handler_budget: config.handler_budget,
            publish_timeout: config.publish_timeout,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
        }
    }

    /// Process one inbound request payload, publishing exactly one
    /// correlated response.
    pub async fn handle(&self, payload: Bytes) -> anyhow::Result<()> {
        let request = match envelope::decode_request(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "request decode failed");
                let corr = e.corr().map(str::to_string);
                let destination = e
                    .reply_to()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.topics.default_reply(corr.as_deref()));
                let response = ResponseEnvelope::failure(corr, e.to_string());
                return self.publish_response(&destination, &response).await;
            }
        };

        let corr = request
            .corr
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let destination = request
            .reply_to
            .clone()
            .unwrap_or_else(|| self.topics.default_reply(Some(&corr)));

        let spec = match self.registry.resolve(&request.cmd, &request.args) {
            Ok(spec) => spec,
            Err(e) => {
                debug!(corr = %corr, cmd = %request.cmd, error = %e, "resolution failed");
                let response = ResponseEnvelope::failure(Some(corr), e.to_string());
                return self.publish_response(&destination, &response).await;
            }
        };

        debug!(corr = %corr, cmd = %request.cmd, "dispatching");

        let ctx = HandlerContext {
            device_id: self.device_id.clone(),
            corr: corr.clone(),
        };

        let response = match self.in_flight.acquire().await {
            Ok(_permit) => {
                match timeout(self.handler_budget, spec.handler.execute(&ctx, &request.args))
                    .await
                {
                    Ok(Ok(data)) => ResponseEnvelope::success(corr, data),
                    Ok(Err(e)) => {
                        warn!(corr = %ctx.corr, cmd = %request.cmd, error = %e, "handler failed");
                        ResponseEnvelope::failure(Some(corr), e.to_string())
                    }
                    Err(_) => {
                        // The future is dropped here; work the handler
                        // delegated elsewhere is abandoned best-effort.
                        warn!(corr = %ctx.corr, cmd = %request.cmd, "handler exceeded budget");
                        ResponseEnvelope::failure(
                            Some(corr),
                            format!("command timed out after {:?}", self.handler_budget),
                        )
                    }
                }
            }
            Err(_) => ResponseEnvelope::failure(Some(corr), "agent is shutting down".to_string()),
        };

        self.publish_response(&destination, &response).await
    }

    /// Publish a response with a bounded wait; failures are logged and
    /// surfaced to the caller, never retried here.
    async fn publish_response(
        &self,
        destination: &str,
        response: &ResponseEnvelope,
    ) -> anyhow::Result<()> {
        let encoded = envelope::encode_response(response)?;

        let publish = self
            .publisher
            .publish(destination, Bytes::from(encoded), Qos::AtLeastOnce, false);

        match timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                debug!(topic = %destination, ok = response.ok, "response published");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(topic = %destination, error = %e, "response publish failed");
                Err(e.into())
            }
            Err(_) => {
                error!(topic = %destination, "response publish timed out");
                Err(TransportError::PublishTimeout(self.publish_timeout).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::{CommandHandler, Ping};
    use crate::command::registry::CommandSpec;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records every publish so tests can assert the exactly-one property
    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<(String, Bytes)>>>,
    }

    impl RecordingPublisher {
        fn take(&self) -> Vec<(String, ResponseEnvelope)> {
            self.published
                .lock()
                .expect("lock")
                .drain(..)
                .map(|(topic, payload)| {
                    let response = serde_json::from_slice(&payload).expect("response json");
                    (topic, response)
                })
                .collect()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            payload: Bytes,
            _qos: Qos,
            _retain: bool,
        ) -> Result<(), TransportError> {
            self.published
                .lock()
                .expect("lock")
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    struct Sleeper(Duration);

    #[async_trait]
    impl CommandHandler for Sleeper {
        async fn execute(
            &self,
            _ctx: &HandlerContext,
            _args: &Map<String, Value>,
        ) -> anyhow::Result<Value> {
            tokio::time::sleep(self.0).await;
            Ok(json!({ "slept": true }))
        }
    }

    struct Failing;

    #[async_trait]
    impl CommandHandler for Failing {
        async fn execute(
            &self,
            _ctx: &HandlerContext,
            _args: &Map<String, Value>,
        ) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    fn dispatcher(publisher: RecordingPublisher) -> Dispatcher<RecordingPublisher> {
        dispatcher_with_budget(publisher, Duration::from_secs(5))
    }

    fn dispatcher_with_budget(
        publisher: RecordingPublisher,
        budget: Duration,
    ) -> Dispatcher<RecordingPublisher> {
        let mut registry = CommandRegistry::new();
        registry
            .register(CommandSpec::new("ping", &[], Arc::new(Ping)))
            .expect("register");
        registry
            .register(CommandSpec::new(
                "slow",
                &[],
                Arc::new(Sleeper(Duration::from_millis(500))),
            ))
            .expect("register");
        registry
            .register(CommandSpec::new("fail", &[], Arc::new(Failing)))
            .expect("register");
        registry
            .register(CommandSpec::new("mount", &["device", "path"], Arc::new(Ping)))
            .expect("register");

        let config = AgentConfig {
            handler_budget: budget,
            ..Default::default()
        };
        Dispatcher::new(
            registry,
            publisher,
            TopicSet::new("office", "deskpc"),
            &config,
        )
    }

    #[tokio::test]
    async fn test_well_formed_request_gets_one_correlated_response() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        let raw = br#"{"corr":"c-1","cmd":"ping","reply_to":"home/resp/custom"}"#;
        dispatcher
            .handle(Bytes::from_static(raw))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let (topic, response) = &published[0];
        assert_eq!(topic, "home/resp/custom");
        assert_eq!(response.corr.as_deref(), Some("c-1"));
        assert!(response.ok);
        assert_eq!(response.data.as_ref().expect("data")["pong"], true);
        assert_eq!(response.error, None);
    }

    #[tokio::test]
    async fn test_default_reply_destination() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(br#"{"corr":"c-2","cmd":"ping"}"#))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "home/resp/deskpc/c-2");
    }

    #[tokio::test]
    async fn test_missing_corr_is_generated() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(br#"{"cmd":"ping"}"#))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let corr = published[0].1.corr.as_deref().expect("generated corr");
        assert!(!corr.is_empty());
        assert_eq!(published[0].0, format!("home/resp/deskpc/{corr}"));
    }

    #[tokio::test]
    async fn test_malformed_payload_still_answered() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(b"{definitely not json"))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let (topic, response) = &published[0];
        assert_eq!(topic, "home/resp/deskpc/unmatched");
        assert!(!response.ok);
        assert_eq!(response.corr, None);
        assert!(!response.error.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn test_missing_cmd_answers_with_salvaged_routing() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        let raw = br#"{"corr":"c-3","reply_to":"home/resp/there"}"#;
        dispatcher
            .handle(Bytes::from_static(raw))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let (topic, response) = &published[0];
        assert_eq!(topic, "home/resp/there");
        assert_eq!(response.corr.as_deref(), Some("c-3"));
        assert!(!response.ok);
        assert!(response.error.as_deref().expect("error").contains("cmd"));
    }

    #[tokio::test]
    async fn test_unknown_command_reported() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(br#"{"corr":"c-4","cmd":"reboot"}"#))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let response = &published[0].1;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("unknown cmd reboot"));
    }

    #[tokio::test]
    async fn test_missing_args_all_reported() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(br#"{"corr":"c-5","cmd":"mount"}"#))
            .await
            .expect("handle");

        let published = publisher.take();
        let error = published[0].1.error.as_deref().expect("error");
        assert!(error.contains("device") && error.contains("path"), "{error}");
    }

    #[tokio::test]
    async fn test_handler_failure_reported_not_crashed() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        dispatcher
            .handle(Bytes::from_static(br#"{"corr":"c-6","cmd":"fail"}"#))
            .await
            .expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let response = &published[0].1;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("disk on fire"));
        assert_eq!(response.data, None);
    }

    #[tokio::test]
    async fn test_budget_exceeded_answers_within_bounded_overhead() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher_with_budget(publisher.clone(), Duration::from_millis(50));

        let start = Instant::now();
        dispatcher
            .handle(Bytes::from_static(br#"{"corr":"c-7","cmd":"slow"}"#))
            .await
            .expect("handle");
        let elapsed = start.elapsed();

        // Budget is 50ms, the handler sleeps 500ms; the answer must come
        // from the timeout, not the handler finishing.
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");

        let published = publisher.take();
        assert_eq!(published.len(), 1);
        let response = &published[0].1;
        assert!(!response.ok);
        assert!(response
            .error
            .as_deref()
            .expect("error")
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_duplicate_corr_answered_independently() {
        let publisher = RecordingPublisher::default();
        let dispatcher = dispatcher(publisher.clone());

        let raw = Bytes::from_static(br#"{"corr":"dup","cmd":"ping"}"#);
        dispatcher.handle(raw.clone()).await.expect("handle");
        dispatcher.handle(raw).await.expect("handle");

        let published = publisher.take();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|(_, r)| r.corr.as_deref() == Some("dup")));
    }
}
