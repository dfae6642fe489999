//! Deterministic generator for offline runs and tests.

use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::TextGenerator;
use serde_json::{Value, json};

/// Answers without leaving the process: the reply is a trimmed echo of the
/// prompt, so the same prompt always yields the same text.
#[derive(Debug, Clone)]
pub struct OfflineGenerator {
    max_chars: usize,
}

const DEFAULT_MAX_CHARS: usize = 280;

impl Default for OfflineGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineGenerator {
    pub fn new() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn invoke(&self, prompt: &str, context_ids: &[String]) -> Result<String> {
        let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        let body: String = flat.chars().take(self.max_chars).collect();
        let ellipsis = if flat.chars().count() > self.max_chars { "…" } else { "" };
        if context_ids.is_empty() {
            Ok(format!("{body}{ellipsis}"))
        } else {
            Ok(format!("{body}{ellipsis} (context: {})", context_ids.join(", ")))
        }
    }

    async fn fetch_external(&self, source: &str, query: &str) -> Result<Value> {
        Ok(json!({
            "source": source,
            "query": query,
            "items": [],
            "offline": true,
        }))
    }
}
