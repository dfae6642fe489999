//! Fakes shared by the tool tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{NoteReader, TextGenerator, Tool, ToolContext};
use notefabric_core::types::{Edge, Note, ToolDefinition};
use serde_json::{Value, json};

#[derive(Default)]
pub struct FakeNotes {
    notes: HashMap<String, Note>,
}

impl FakeNotes {
    pub fn with(notes: Vec<Note>) -> Self {
        Self {
            notes: notes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }
}

impl NoteReader for FakeNotes {
    fn get_note(&self, id: &str) -> Option<Note> {
        self.notes.get(id).cloned()
    }

    fn get_notes(&self) -> Vec<Note> {
        self.notes.values().cloned().collect()
    }

    fn get_references(&self, id: &str) -> Vec<Edge> {
        self.notes
            .get(id)
            .map(|n| {
                n.references
                    .iter()
                    .map(|t| Edge::new(id, t, "references"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Echoes the prompt back so tests can assert on what was asked.
pub struct FakeGenerator;

#[async_trait]
impl TextGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn invoke(&self, prompt: &str, context_ids: &[String]) -> Result<String> {
        Ok(format!("[{}] {prompt}", context_ids.join(",")))
    }

    async fn fetch_external(&self, source: &str, query: &str) -> Result<Value> {
        Ok(json!({"source": source, "query": query, "items": []}))
    }
}

pub struct FailingTool {
    name: String,
    message: String,
    schema: Value,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            schema: json!({"type": "object"}),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: "always fails".into(),
            input_schema: self.schema.clone(),
        }
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        Err(FabricError::Provider(self.message.clone()))
    }
}

pub fn context() -> ToolContext {
    context_with(Vec::new())
}

pub fn context_with(notes: Vec<Note>) -> ToolContext {
    ToolContext::new(Arc::new(FakeNotes::with(notes)), Arc::new(FakeGenerator))
}
