//! Built-in command handler capabilities

mod ping;
mod run;
mod wol;

pub use ping::Ping;
pub use run::ShellRun;
pub use wol::WakeOnLan;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Context passed to command handlers
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub device_id: String,
    /// Correlation id of the request being served
    pub corr: String,
}

/// A capability implementing one command's behavior.
///
/// Handlers report domain failures through the returned error; the
/// dispatcher converts them into `ok=false` responses and never crashes
/// on a failing handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(
        &self,
        ctx: &HandlerContext,
        args: &Map<String, Value>,
    ) -> anyhow::Result<Value>;
}
