//! External test hooks, run after a note completes.

use std::sync::Arc;

use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::ToolContext;
use notefabric_core::types::Note;
use notefabric_tools::ToolRegistry;
use serde_json::{Value, json};

/// A best-effort check run against a completed note. Its outcome is
/// recorded in the note's memory and never changes the note's status.
#[async_trait]
pub trait TestHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, note: &Note, ctx: &ToolContext) -> Result<Value>;
}

/// Runs a registered tool with `{noteId, title, content}` as its test.
pub struct ToolTestHook {
    tool: String,
    registry: Arc<ToolRegistry>,
}

impl ToolTestHook {
    pub fn new(tool: &str, registry: Arc<ToolRegistry>) -> Self {
        Self {
            tool: tool.to_string(),
            registry,
        }
    }
}

#[async_trait]
impl TestHook for ToolTestHook {
    fn name(&self) -> &str {
        &self.tool
    }

    async fn run(&self, note: &Note, ctx: &ToolContext) -> Result<Value> {
        let input = json!({
            "noteId": note.id,
            "title": note.title,
            "content": note.content,
        });
        self.registry.execute(&self.tool, input, ctx).await
    }
}
