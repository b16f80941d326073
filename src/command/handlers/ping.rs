//! Liveness check handler

use super::{CommandHandler, HandlerContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Answers with a truthy flag; never fails
#[derive(Debug, Default)]
pub struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    async fn execute(
        &self,
        _ctx: &HandlerContext,
        _args: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        Ok(json!({ "pong": true }))
    }
}
