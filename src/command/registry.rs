//! Command registry: name to handler-capability lookup with argument
//! validation

use super::handlers::CommandHandler;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A command registered at startup, immutable thereafter
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub required_args: Vec<&'static str>,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new(
        name: impl Into<String>,
        required_args: &[&'static str],
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            required_args: required_args.to_vec(),
            handler,
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("required_args", &self.required_args)
            .finish_non_exhaustive()
    }
}

/// Registration failure: the name is already taken
#[derive(Debug, Error, PartialEq, Eq)]
#[error("command `{0}` is already registered")]
pub struct DuplicateCommand(pub String);

/// Resolution failures reported back to the requester
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("unknown cmd {name}")]
    UnknownCommand { name: String },

    /// Lists every required argument absent from the request, so the
    /// caller gets one complete diagnostic
    #[error("missing required args: {}", .names.join(", "))]
    MissingArgs { names: Vec<String> },
}

/// Lookup table of command capabilities
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec) -> Result<(), DuplicateCommand> {
        if self.commands.contains_key(&spec.name) {
            return Err(DuplicateCommand(spec.name));
        }
        self.commands.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Look up a command and validate the argument shape. Pure lookup,
    /// no side effects.
    pub fn resolve(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<&CommandSpec, ResolutionError> {
        let spec = self
            .commands
            .get(name)
            .ok_or_else(|| ResolutionError::UnknownCommand {
                name: name.to_string(),
            })?;

        let missing: Vec<String> = spec
            .required_args
            .iter()
            .filter(|arg| !args.contains_key(**arg))
            .map(|arg| arg.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ResolutionError::MissingArgs { names: missing });
        }

        Ok(spec)
    }
}
