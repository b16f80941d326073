//! Shell execution handler
//!
//! Executes a requester-supplied command string on the host. The
//! capability is gated by [`ShellPolicy`] and is disabled unless the
//! configuration explicitly grants it.

use super::{CommandHandler, HandlerContext};
use crate::config::ShellPolicy;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::info;

/// Runs command strings through `sh -c` with merged output capture
#[derive(Debug)]
pub struct ShellRun {
    policy: ShellPolicy,
}

impl ShellRun {
    pub fn new(policy: ShellPolicy) -> Self {
        Self { policy }
    }

    fn check_policy(&self, sh: &str) -> Result<()> {
        match &self.policy {
            ShellPolicy::Unrestricted => Ok(()),
            ShellPolicy::Disabled => bail!("shell execution is disabled on this device"),
            ShellPolicy::AllowList(programs) => {
                let program = sh.split_whitespace().next().unwrap_or("");
                if programs.iter().any(|p| p == program) {
                    Ok(())
                } else {
                    bail!("program `{program}` is not in the shell allow-list")
                }
            }
        }
    }
}

#[async_trait]
impl CommandHandler for ShellRun {
    async fn execute(
        &self,
        ctx: &HandlerContext,
        args: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        let sh = args
            .get("sh")
            .and_then(Value::as_str)
            .context("`sh` must be a string")?;
        self.check_policy(sh)?;

        info!(corr = %ctx.corr, "executing shell command");

        // kill_on_drop: a budget-exceeded command must not outlive its
        // request
        let output = Command::new("sh")
            .arg("-c")
            .arg(sh)
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to spawn shell")?;

        let mut out = String::from_utf8_lossy(&output.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            bail!("{}: {}", output.status, out.trim());
        }

        Ok(json!({ "out": out }))
    }
}
