//! Note graph data model: the persisted, schedulable units of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PRIORITY: u8 = 50;
pub const MAX_PRIORITY: u8 = 100;

/// Lifecycle status of a note.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NoteStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    PendingUnitTesting,
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::PendingUnitTesting => write!(f, "pendingUnitTesting"),
        }
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One tool invocation within a note's workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within the owning note.
    pub id: String,
    /// Capability name dispatched through the tool registry.
    pub tool: String,
    /// May reference prior outputs as `${stepId}`.
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(id: &str, tool: &str, input: Value) -> Self {
        Self {
            id: id.to_string(),
            tool: tool.to_string(),
            input,
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            error: None,
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// Kind of an execution-log record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MemoryEntryType {
    StepResult,
    Error,
    System,
    Summary,
    TestResult,
}

/// Immutable execution-log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    #[serde(rename = "type")]
    pub entry_type: MemoryEntryType,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl MemoryEntry {
    pub fn new(entry_type: MemoryEntryType, content: Value) -> Self {
        Self {
            entry_type,
            content,
            timestamp: Utc::now(),
            step_id: None,
        }
    }

    pub fn step_result(step_id: &str, output: Value) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            ..Self::new(MemoryEntryType::StepResult, output)
        }
    }

    pub fn step_error(step_id: &str, message: &str) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            ..Self::new(MemoryEntryType::Error, Value::String(message.to_string()))
        }
    }

    pub fn system(message: &str) -> Self {
        Self::new(MemoryEntryType::System, Value::String(message.to_string()))
    }
}

/// Typed directed reference between two notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relationship: String,
}

impl Edge {
    pub fn new(source_id: &str, target_id: &str, relationship: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relationship: relationship.to_string(),
        }
    }
}

/// The unit of persisted, schedulable work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Opaque payload, never interpreted by the engine.
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub status: NoteStatus,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logic: Vec<Step>,
    #[serde(default)]
    pub memory: Vec<MemoryEntry>,
    /// Outgoing edge targets; denormalized view of the graph store's edges.
    #[serde(default)]
    pub references: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Set only on generated unit-test notes: the id of the note under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_target: Option<String>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Note {
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: Value::Null,
            status: NoteStatus::Pending,
            priority: DEFAULT_PRIORITY,
            deadline: None,
            logic: Vec::new(),
            memory: Vec::new(),
            references: Vec::new(),
            created_at: now,
            updated_at: now,
            tests: Vec::new(),
            retry_count: 0,
            test_target: None,
        }
    }

    pub fn with_logic(mut self, logic: Vec<Step>) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.logic.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.logic.iter_mut().find(|s| s.id == id)
    }

    /// True when every step has completed (vacuously true for empty logic).
    pub fn all_steps_completed(&self) -> bool {
        self.logic.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn has_pending_steps(&self) -> bool {
        self.logic.iter().any(|s| s.status == StepStatus::Pending)
    }

    pub fn push_memory(&mut self, entry: MemoryEntry) {
        self.memory.push(entry);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Catalog entry describing a capability to clients and to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the capability's input.
    pub input_schema: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_serializes_camel_case() {
        let note = Note::new("hello").with_logic(vec![Step::new("1", "echo", Value::Null)]);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], 50);
        assert_eq!(json["logic"][0]["status"], "pending");
    }

    #[test]
    fn test_note_defaults_on_sparse_input() {
        let note: Note = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "logic": [{"id": "1", "tool": "echo"}]
        }))
        .unwrap();
        assert_eq!(note.priority, DEFAULT_PRIORITY);
        assert_eq!(note.status, NoteStatus::Pending);
        assert_eq!(note.logic[0].status, StepStatus::Pending);
        assert!(note.logic[0].dependencies.is_empty());
    }

    #[test]
    fn test_pending_unit_testing_wire_name() {
        let json = serde_json::to_value(NoteStatus::PendingUnitTesting).unwrap();
        assert_eq!(json, "pendingUnitTesting");
    }

    #[test]
    fn test_memory_entry_type_field() {
        let entry = MemoryEntry::step_result("a", serde_json::json!(42));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "stepResult");
        assert_eq!(json["stepId"], "a");
    }

    #[test]
    fn test_completion_is_vacuous_for_empty_logic() {
        assert!(Note::new("empty").all_steps_completed());
    }
}
