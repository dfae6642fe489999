use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

/// Returns its input unchanged. Handy for wiring and for tests.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "Return the input unchanged".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value> {
        Ok(input)
    }
}
