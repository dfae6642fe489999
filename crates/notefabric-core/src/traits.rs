//! Collaborator traits: the narrow seams the engine depends on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Edge, Note, ToolDefinition};

/// A named, schema-validated capability.
///
/// Invocations are stateless from the registry's point of view; a tool must
/// not assume anything about call order.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// `input` has already been validated against `definition().input_schema`.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Read-only view of the note graph handed to tools.
pub trait NoteReader: Send + Sync {
    fn get_note(&self, id: &str) -> Option<Note>;
    fn get_notes(&self) -> Vec<Note>;
    fn get_references(&self, id: &str) -> Vec<Edge>;
}

/// External text-generation / analysis facility.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, prompt: &str, context_ids: &[String]) -> Result<String>;

    async fn fetch_external(&self, source: &str, query: &str) -> Result<Value>;
}

/// Persistent storage medium for notes.
#[async_trait]
pub trait NoteStorage: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<Note>>;

    async fn save(&self, note: &Note) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Strip `id` from the `references` of every stored note.
    async fn remove_references_to(&self, id: &str) -> Result<()>;
}

/// Bundle passed into every tool dispatch instead of ambient globals.
#[derive(Clone)]
pub struct ToolContext {
    pub notes: Arc<dyn NoteReader>,
    pub generator: Arc<dyn TextGenerator>,
    /// Note whose step is being executed, if any.
    pub note_id: Option<String>,
    pub step_id: Option<String>,
}

impl ToolContext {
    pub fn new(notes: Arc<dyn NoteReader>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            notes,
            generator,
            note_id: None,
            step_id: None,
        }
    }

    pub fn for_step(&self, note_id: &str, step_id: &str) -> Self {
        Self {
            note_id: Some(note_id.to_string()),
            step_id: Some(step_id.to_string()),
            ..self.clone()
        }
    }
}
