use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

use super::str_field;

/// Pull data from an external source through the generator's fetch seam.
pub struct FetchExternalTool;

#[async_trait]
impl Tool for FetchExternalTool {
    fn name(&self) -> &str {
        "fetch_external"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_external".into(),
            description: "Fetch data from an external source (URL or named feed) for a query".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string", "minLength": 1},
                    "query": {"type": "string"}
                },
                "required": ["source", "query"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let source = str_field(&input, "source").unwrap_or_default();
        let query = str_field(&input, "query").unwrap_or_default();
        tracing::debug!("🌐 fetch_external: {source} ({query})");
        ctx.generator.fetch_external(source, query).await
    }
}
