//! Built-in capabilities registered by [`ToolRegistry::with_defaults`](crate::ToolRegistry::with_defaults).

mod code_gen;
mod echo;
mod fetch_external;
mod note_lookup;
mod summarize;
mod unit_test;

pub use code_gen::CodeGenTool;
pub use echo::EchoTool;
pub use fetch_external::FetchExternalTool;
pub use note_lookup::NoteLookupTool;
pub use summarize::SummarizeTool;
pub use unit_test::UnitTestTool;

use std::sync::Arc;

use notefabric_core::traits::Tool;
use serde_json::Value;

/// Every built-in tool, in registration order.
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EchoTool),
        Arc::new(SummarizeTool),
        Arc::new(FetchExternalTool),
        Arc::new(NoteLookupTool),
        Arc::new(CodeGenTool),
        Arc::new(UnitTestTool),
    ]
}

/// Read an optional string field, already schema-checked.
pub(crate) fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(|v| v.as_str())
}

/// Context ids passed to the generator: the running note plus its references.
pub(crate) fn context_ids(ctx: &notefabric_core::traits::ToolContext) -> Vec<String> {
    let Some(note_id) = ctx.note_id.as_deref() else {
        return Vec::new();
    };
    let mut ids = vec![note_id.to_string()];
    ids.extend(ctx.notes.get_references(note_id).into_iter().map(|e| e.target_id));
    ids
}
