//! Failure policy: a linear decision list over a failed run.
//!
//! 1. retry transient failures while the retry budget lasts
//! 2. escalate code generation failures (and, if enabled, tool errors)
//!    into a unit-test request note
//! 3. otherwise fail terminally

use notefabric_core::config::FailureConfig;
use notefabric_core::error::{ErrorKind, FabricError};
use notefabric_core::types::{MemoryEntry, Note, NoteStatus, Step, StepStatus};
use serde_json::json;

/// Tool whose failures always escalate.
pub const CODE_GEN_TOOL: &str = "code_gen";
/// Relationship of the edge from a unit-test note to the note it tests.
pub const TESTS_RELATIONSHIP: &str = "tests";
/// `content.kind` of a generated unit-test note, for clients.
pub const UNIT_TEST_KIND: &str = "unitTestRequest";

const TEST_PRIORITY_BOOST: u8 = 10;
const MIN_TEST_PRIORITY: u8 = 60;
const MAX_TEST_PRIORITY: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Retry,
    Escalate,
    Fail,
}

#[derive(Debug, Clone)]
pub struct FailurePolicy {
    max_retries: u32,
    escalate_tool_errors: bool,
    test_tool: String,
}

impl FailurePolicy {
    pub fn new(config: &FailureConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            escalate_tool_errors: config.escalate_tool_errors,
            test_tool: config.test_tool.clone(),
        }
    }

    /// Timeouts and rate limiting are worth another attempt. Only a tool's
    /// own failure message is inspected, never tool names or schema paths.
    pub fn is_transient(error: &FabricError) -> bool {
        match error {
            _ if error.kind() == ErrorKind::Transient => true,
            FabricError::ToolExecution { message, .. } => {
                let message = message.to_lowercase();
                message.contains("timeout") || message.contains("rate limit")
            }
            _ => false,
        }
    }

    pub fn is_unit_test_note(note: &Note) -> bool {
        note.test_target.is_some()
    }

    pub fn decide(&self, note: &Note, error: &FabricError) -> FailureDecision {
        let kind = error.kind();
        if kind.is_configuration() {
            return FailureDecision::Fail;
        }
        if Self::is_transient(error) && note.retry_count < self.max_retries {
            return FailureDecision::Retry;
        }
        if Self::is_unit_test_note(note) {
            return FailureDecision::Fail;
        }

        let code_gen_failed = note
            .logic
            .iter()
            .any(|s| s.tool == CODE_GEN_TOOL && s.status == StepStatus::Failed);
        let tool_error = matches!(kind, ErrorKind::ToolNotFound | ErrorKind::ToolExecution);
        if code_gen_failed || (self.escalate_tool_errors && tool_error) {
            FailureDecision::Escalate
        } else {
            FailureDecision::Fail
        }
    }

    /// Put a note back to pending with its unfinished steps reset.
    pub fn retry(&self, note: &mut Note, error: &FabricError) {
        note.retry_count += 1;
        note.status = NoteStatus::Pending;
        for step in &mut note.logic {
            if matches!(step.status, StepStatus::Failed | StepStatus::Running) {
                step.status = StepStatus::Pending;
                step.error = None;
            }
        }
        note.push_memory(MemoryEntry::system(&format!(
            "retry {}/{} after: {}",
            note.retry_count,
            self.max_retries,
            error.message()
        )));
    }

    /// Park `note` as pending unit testing and build the test request note.
    /// The caller is responsible for inserting and admitting the returned note.
    pub fn escalate(&self, note: &mut Note, error: &FabricError) -> Note {
        let message = error.message();
        let priority = note
            .priority
            .saturating_add(TEST_PRIORITY_BOOST)
            .clamp(MIN_TEST_PRIORITY, MAX_TEST_PRIORITY);

        let mut test = Note::new(&format!("Unit test: {}", note.title)).with_priority(priority);
        test.content = json!({
            "kind": UNIT_TEST_KIND,
            "targetNoteId": note.id,
            "error": message,
        });
        test.references = vec![note.id.clone()];
        test.test_target = Some(note.id.clone());
        test.logic = vec![Step::new(
            "1",
            &self.test_tool,
            json!({ "targetNoteId": note.id, "error": message }),
        )];
        test.push_memory(MemoryEntry::system(&format!(
            "created to test note '{}'",
            note.id
        )));

        note.status = NoteStatus::PendingUnitTesting;
        note.tests.push(test.id.clone());
        note.push_memory(MemoryEntry::system(&format!(
            "escalated to unit test note '{}'",
            test.id
        )));
        test
    }

    pub fn fail(&self, note: &mut Note, error: &FabricError) {
        note.status = NoteStatus::Failed;
        note.push_memory(MemoryEntry::system(&format!("failed: {}", error.message())));
    }
}
