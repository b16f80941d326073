//! Agent configuration from environment variables

use homelink_shared::timing;
use std::time::Duration;

/// Execution policy for the shell capability.
///
/// Anything other than `Disabled` lets broker-authenticated requesters run
/// code on this host; the default is `Disabled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellPolicy {
    /// Reject every shell request
    Disabled,
    /// Permit only command strings whose program token is listed
    AllowList(Vec<String>),
    /// Permit any command string
    Unrestricted,
}

/// Configuration for the agent process
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Broker bridge host
    pub broker: String,
    /// Broker bridge port
    pub port: u16,
    /// Auth user presented to the bridge
    pub user: String,
    /// Auth secret presented to the bridge
    pub secret: String,
    /// Room name used in topic paths
    pub room: String,
    /// Device identity
    pub device_id: String,
    /// Policy for the shell execution capability
    pub shell_policy: ShellPolicy,
    /// Execution budget for a single command handler
    pub handler_budget: Duration,
    /// Heartbeat publish interval
    pub heartbeat_interval: Duration,
    /// Bound on a single outbound publish
    pub publish_timeout: Duration,
    /// Maximum concurrent handler executions
    pub max_in_flight: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1".into(),
            port: 1883,
            user: "homeuser".into(),
            secret: "changeme".into(),
            room: "office".into(),
            device_id: "deskpc".into(),
            shell_policy: ShellPolicy::Disabled,
            handler_budget: Duration::from_millis(timing::HANDLER_BUDGET_MS),
            heartbeat_interval: Duration::from_millis(timing::HEARTBEAT_INTERVAL_MS),
            publish_timeout: Duration::from_millis(timing::PUBLISH_TIMEOUT_MS),
            max_in_flight: timing::MAX_IN_FLIGHT,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// Recognized keys (each falls back to the default above when unset):
    /// `BROKER`, `PORT`, `MQTT_USER`, `MQTT_PASS`, `ROOM`, `DEVICE_ID`,
    /// `ALLOW_SHELL` (`1`/`true` lifts the shell restriction entirely) and
    /// `SHELL_ALLOWLIST` (comma-separated program names).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = get("BROKER") {
            config.broker = v;
        }
        if let Some(v) = get("PORT").and_then(|v| v.parse().ok()) {
            config.port = v;
        }
        if let Some(v) = get("MQTT_USER") {
            config.user = v;
        }
        if let Some(v) = get("MQTT_PASS") {
            config.secret = v;
        }
        if let Some(v) = get("ROOM") {
            config.room = v;
        }
        if let Some(v) = get("DEVICE_ID") {
            config.device_id = v;
        }

        config.shell_policy = match (get("ALLOW_SHELL"), get("SHELL_ALLOWLIST")) {
            (Some(v), _) if v == "1" || v.eq_ignore_ascii_case("true") => ShellPolicy::Unrestricted,
            (_, Some(list)) => ShellPolicy::AllowList(
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => ShellPolicy::Disabled,
        };

        config
    }

    /// Bridge address in `host:port` form
    pub fn bridge_addr(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.broker, "127.0.0.1");
        assert_eq!(config.port, 1883);
        assert_eq!(config.user, "homeuser");
        assert_eq!(config.secret, "changeme");
        assert_eq!(config.room, "office");
        assert_eq!(config.device_id, "deskpc");
        assert_eq!(config.shell_policy, ShellPolicy::Disabled);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.handler_budget, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let config = AgentConfig::from_lookup(|key| match key {
            "BROKER" => Some("10.0.0.5".into()),
            "PORT" => Some("8883".into()),
            "ROOM" => Some("livingroom".into()),
            "DEVICE_ID" => Some("mediapc".into()),
            _ => None,
        });
        assert_eq!(config.broker, "10.0.0.5");
        assert_eq!(config.port, 8883);
        assert_eq!(config.room, "livingroom");
        assert_eq!(config.device_id, "mediapc");
        assert_eq!(config.bridge_addr(), "10.0.0.5:8883");
        // Untouched keys keep their defaults
        assert_eq!(config.user, "homeuser");
    }

    #[test]
    fn test_unparsable_port_falls_back() {
        let config = AgentConfig::from_lookup(|key| match key {
            "PORT" => Some("not-a-port".into()),
            _ => None,
        });
        assert_eq!(config.port, 1883);
    }

    #[test]
    fn test_shell_policy_unrestricted() {
        let config = AgentConfig::from_lookup(|key| match key {
            "ALLOW_SHELL" => Some("1".into()),
            _ => None,
        });
        assert_eq!(config.shell_policy, ShellPolicy::Unrestricted);
    }

    #[test]
    fn test_shell_policy_allowlist() {
        let config = AgentConfig::from_lookup(|key| match key {
            "SHELL_ALLOWLIST" => Some("uptime, systemctl".into()),
            _ => None,
        });
        assert_eq!(
            config.shell_policy,
            ShellPolicy::AllowList(vec!["uptime".into(), "systemctl".into()])
        );
    }

    #[test]
    fn test_shell_policy_defaults_disabled() {
        let config = AgentConfig::from_lookup(|_| None);
        assert_eq!(config.shell_policy, ShellPolicy::Disabled);
    }
}
