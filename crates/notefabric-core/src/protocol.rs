//! Client wire protocol.
//!
//! ```text
//! → {"type":"createNote","title":"..."}
//! → {"type":"updateNote","id":"...", ...fields}
//! → {"type":"deleteNote","id":"..."}
//! ← {"type":"notes","data":[Note]}
//! ← {"type":"noteUpdate","data":Note}
//! ← {"type":"tools","data":[ToolDefinition]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Note, ToolDefinition};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    CreateNote {
        title: String,
    },
    UpdateNote {
        id: String,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    DeleteNote {
        id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Full snapshot, sent on connect and after structural changes.
    Notes { data: Vec<Note> },
    /// One note, sent per flush.
    NoteUpdate { data: Note },
    Tools { data: Vec<ToolDefinition> },
    Error { message: String },
}
