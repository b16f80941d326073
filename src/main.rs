mod agent;
mod command;
mod config;
mod presence;
mod transport;

use config::AgentConfig;
use homelink_shared::topic::{TopicSet, STATUS_OFFLINE};
use homelink_shared::wire::LastWill;
use transport::{BridgeConfig, BridgeTransport};

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::from_env();

    info!("HomeLink agent starting: {}", config.device_id);
    info!("  bridge: {}", config.bridge_addr());
    info!("  room: {}", config.room);
    info!("  shell policy: {:?}", config.shell_policy);

    let topics = TopicSet::new(&config.room, &config.device_id);

    // The broker publishes this on our behalf if the connection drops
    // without a clean shutdown.
    let will = LastWill {
        topic: topics.status.clone(),
        payload: STATUS_OFFLINE.as_bytes().to_vec(),
        retain: true,
    };

    let bridge = BridgeConfig {
        address: config.bridge_addr(),
        client_id: format!("pc-{}", config.device_id),
        user: Some(config.user.clone()),
        secret: Some(config.secret.clone()),
        ..Default::default()
    };
    let transport = BridgeTransport::connect(bridge, will);

    let registry = command::builtin_registry(&config)?;

    agent::run(config, topics, registry, transport).await
}
