use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

use super::{context_ids, str_field};

/// Summarize a block of text with the configured generator.
pub struct SummarizeTool;

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "summarize".into(),
            description: "Summarize text, optionally bounded to a word count".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "minLength": 1},
                    "maxWords": {"type": "integer", "minimum": 1}
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let text = str_field(&input, "text").unwrap_or_default();
        let prompt = match input.get("maxWords").and_then(|v| v.as_u64()) {
            Some(n) => format!("Summarize in at most {n} words:\n\n{text}"),
            None => format!("Summarize concisely:\n\n{text}"),
        };
        let summary = ctx.generator.invoke(&prompt, &context_ids(ctx)).await?;
        Ok(json!({ "summary": summary }))
    }
}
