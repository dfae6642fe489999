use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

use super::{context_ids, str_field};

/// Generate source code from a natural-language description.
///
/// Failures of this tool are always escalated to a unit-test note by the
/// engine's failure policy.
pub struct CodeGenTool;

#[async_trait]
impl Tool for CodeGenTool {
    fn name(&self) -> &str {
        "code_gen"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "code_gen".into(),
            description: "Generate code for a described task".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "spec": {"type": "string", "minLength": 1},
                    "language": {"type": "string"}
                },
                "required": ["spec"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let spec = str_field(&input, "spec").unwrap_or_default();
        let language = str_field(&input, "language").unwrap_or("rust");
        let prompt = format!(
            "Write {language} code for the following task. Reply with code only.\n\n{spec}"
        );
        let code = ctx.generator.invoke(&prompt, &context_ids(ctx)).await?;
        if code.trim().is_empty() {
            return Err(FabricError::CodeValidation(
                "generator returned empty code".into(),
            ));
        }
        Ok(json!({ "language": language, "code": code }))
    }
}
