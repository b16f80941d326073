//! Command execution infrastructure for the agent
//!
//! This module handles:
//! - Registering command capabilities and validating request arguments
//! - Dispatching inbound requests to handlers under an execution budget
//! - Producing exactly one correlated response per request

mod dispatcher;
pub mod handlers;
mod registry;

pub use dispatcher::Dispatcher;
pub use registry::{CommandRegistry, CommandSpec, DuplicateCommand, ResolutionError};

use crate::config::AgentConfig;
use handlers::{Ping, ShellRun, WakeOnLan};
use std::sync::Arc;

/// Build the registry of built-in commands.
///
/// `run` is registered with the configured shell policy; any policy other
/// than `Disabled` grants broker-authenticated requesters arbitrary code
/// execution on this host.
pub fn builtin_registry(config: &AgentConfig) -> Result<CommandRegistry, DuplicateCommand> {
    let mut registry = CommandRegistry::new();
    registry.register(CommandSpec::new("ping", &[], Arc::new(Ping)))?;
    registry.register(CommandSpec::new("wol", &["mac"], Arc::new(WakeOnLan::default())))?;
    registry.register(CommandSpec::new(
        "run",
        &["sh"],
        Arc::new(ShellRun::new(config.shell_policy.clone())),
    ))?;
    Ok(registry)
}
