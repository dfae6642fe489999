use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

use super::str_field;

/// Draft a unit test for a failing note. The escalation step of generated
/// test notes runs this tool.
pub struct UnitTestTool;

#[async_trait]
impl Tool for UnitTestTool {
    fn name(&self) -> &str {
        "unit_test"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "unit_test".into(),
            description: "Draft a unit test reproducing a note's failure".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "targetNoteId": {"type": "string", "minLength": 1},
                    "error": {"type": "string"}
                },
                "required": ["targetNoteId"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let target_id = str_field(&input, "targetNoteId").unwrap_or_default();
        let error = str_field(&input, "error").unwrap_or("unknown failure");
        let target = ctx
            .notes
            .get_note(target_id)
            .ok_or_else(|| FabricError::NoteNotFound(target_id.to_string()))?;

        let steps: Vec<String> = target
            .logic
            .iter()
            .map(|s| format!("- {} ({}): {}", s.id, s.tool, s.input))
            .collect();
        let prompt = format!(
            "Write a unit test that reproduces this failure.\n\nNote: {}\nError: {error}\nSteps:\n{}",
            target.title,
            steps.join("\n")
        );
        let test = ctx
            .generator
            .invoke(&prompt, &[target_id.to_string()])
            .await?;
        Ok(json!({ "targetNoteId": target_id, "test": test }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_with;
    use notefabric_core::types::{Note, Step};

    #[tokio::test]
    async fn test_prompt_carries_error_and_steps() {
        let target = Note::new("broken")
            .with_logic(vec![Step::new("1", "code_gen", json!({"spec": "sort"}))]);
        let id = target.id.clone();
        let out = UnitTestTool
            .execute(
                json!({"targetNoteId": id, "error": "boom"}),
                &context_with(vec![target]),
            )
            .await
            .unwrap();
        let test = out["test"].as_str().unwrap();
        assert!(test.contains("boom"));
        assert!(test.contains("code_gen"));
        assert_eq!(out["targetNoteId"], id);
    }
}
