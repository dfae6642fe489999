//! Error taxonomy for the execution engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FabricError>;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid input for tool '{tool}': {}", .violations.join("; "))]
    ToolInputInvalid {
        tool: String,
        violations: Vec<String>,
    },

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("note '{note_id}' failed: {message}")]
    NoteExecution { note_id: String, message: String },

    #[error("capability definition rejected: {0}")]
    CodeValidation(String),

    #[error("step '{step_id}' of note '{note_id}' depends on unknown steps: {}", .missing.join(", "))]
    StaleDependency {
        note_id: String,
        step_id: String,
        missing: Vec<String>,
    },

    #[error("dependency cycle in note '{note_id}' among steps: {}", .steps.join(", "))]
    DependencyCycle { note_id: String, steps: Vec<String> },

    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("rejected update to note '{note_id}': {message}")]
    InvalidUpdate { note_id: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse class of a failure, as seen by the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolNotFound,
    ToolInputInvalid,
    ToolExecution,
    NoteExecution,
    CodeValidation,
    StaleDependency,
    DependencyCycle,
    Transient,
    Storage,
    Other,
}

impl ErrorKind {
    /// Configuration errors are never retried nor escalated.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::StaleDependency | Self::DependencyCycle)
    }
}

impl FabricError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ToolInputInvalid { .. } => ErrorKind::ToolInputInvalid,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::NoteExecution { .. } | Self::NoteNotFound(_) => ErrorKind::NoteExecution,
            Self::CodeValidation(_) => ErrorKind::CodeValidation,
            Self::StaleDependency { .. } => ErrorKind::StaleDependency,
            Self::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            Self::Timeout(_) => ErrorKind::Transient,
            Self::Storage(_) | Self::Io(_) => ErrorKind::Storage,
            Self::InvalidUpdate { .. }
            | Self::Provider(_)
            | Self::Config(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Underlying message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::ToolExecution { message, .. } | Self::NoteExecution { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_invalid_lists_every_violation() {
        let err = FabricError::ToolInputInvalid {
            tool: "web".into(),
            violations: vec!["/query: required".into(), "/limit: not an integer".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("/query: required"));
        assert!(msg.contains("/limit: not an integer"));
    }

    #[test]
    fn test_timeout_is_transient() {
        assert_eq!(
            FabricError::Timeout("step 'a'".into()).kind(),
            ErrorKind::Transient
        );
        assert!(FabricError::Timeout("x".into()).to_string().contains("timeout"));
    }

    #[test]
    fn test_execution_message_is_preserved() {
        let err = FabricError::ToolExecution {
            tool: "x".into(),
            message: "rate limit exceeded".into(),
        };
        assert_eq!(err.message(), "rate limit exceeded");
        assert_eq!(err.kind(), ErrorKind::ToolExecution);
    }
}
