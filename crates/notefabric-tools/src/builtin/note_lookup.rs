use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{Tool, ToolContext};
use notefabric_core::types::ToolDefinition;
use serde_json::{Value, json};

use super::str_field;

/// Read another note from the graph: title, status, content and outgoing edges.
pub struct NoteLookupTool;

#[async_trait]
impl Tool for NoteLookupTool {
    fn name(&self) -> &str {
        "note_lookup"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "note_lookup".into(),
            description: "Look up a note by id and return its title, status, content and references".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "noteId": {"type": "string", "minLength": 1}
                },
                "required": ["noteId"]
            }),
        }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let id = str_field(&input, "noteId").unwrap_or_default();
        let note = ctx
            .notes
            .get_note(id)
            .ok_or_else(|| FabricError::NoteNotFound(id.to_string()))?;
        let edges: Vec<Value> = ctx
            .notes
            .get_references(id)
            .into_iter()
            .map(|e| json!({"targetId": e.target_id, "relationship": e.relationship}))
            .collect();
        Ok(json!({
            "id": note.id,
            "title": note.title,
            "status": note.status,
            "content": note.content,
            "references": edges,
        }))
    }
}
