//! Execution-log compaction.

use std::sync::Arc;

use notefabric_core::config::MemoryConfig;
use notefabric_core::traits::TextGenerator;
use notefabric_core::types::{MemoryEntry, MemoryEntryType, Note};
use serde_json::{Value, json};

/// Longest rendering of a single entry fed into the summary prompt.
const MAX_ENTRY_CHARS: usize = 200;

/// Bounds `note.memory` by folding old entries into one `summary` entry.
///
/// Compaction runs when the log exceeds the threshold, and again on any
/// later run where a compacted log has grown past `tail + 1`, so that once
/// compacted a log never holds more than the summary plus the tail.
pub struct MemoryEvictor {
    threshold: usize,
    tail: usize,
    generator: Arc<dyn TextGenerator>,
}

impl MemoryEvictor {
    /// The retained tail is clamped below the threshold, so an unvalidated
    /// config still yields a working bound.
    pub fn new(config: &MemoryConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let threshold = config.eviction_threshold;
        let tail = config.retained_tail.min(threshold.saturating_sub(1));
        if tail != config.retained_tail {
            tracing::warn!(
                "⚠️ memory.retained_tail ({}) must be below eviction_threshold ({threshold}), using {tail}",
                config.retained_tail
            );
        }
        Self {
            threshold,
            tail,
            generator,
        }
    }

    pub fn needs_eviction(&self, note: &Note) -> bool {
        let len = note.memory.len();
        let compacted = note
            .memory
            .first()
            .is_some_and(|e| e.entry_type == MemoryEntryType::Summary);
        len > self.threshold || (compacted && len > self.tail + 1)
    }

    /// Compact `note.memory` in place. Returns true if anything changed.
    pub async fn evict(&self, note: &mut Note) -> bool {
        if !self.needs_eviction(note) {
            return false;
        }
        let split = note.memory.len().saturating_sub(self.tail);
        if split == 0 {
            return false;
        }
        let old: Vec<MemoryEntry> = note.memory.drain(..split).collect();

        let prompt = summary_prompt(&note.title, &old);
        let text = match self.generator.invoke(&prompt, &[note.id.clone()]).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_digest(old.len()),
            Err(e) => {
                tracing::warn!("⚠️ Summarisation failed for note '{}': {e}", note.id);
                fallback_digest(old.len())
            }
        };

        let mut content = json!({ "summary": text, "compacted": old.len() });
        if let (Some(first), Some(last)) = (old.first(), old.last()) {
            content["from"] = Value::String(first.timestamp.to_rfc3339());
            content["to"] = Value::String(last.timestamp.to_rfc3339());
        }
        note.memory.insert(0, MemoryEntry::new(MemoryEntryType::Summary, content));
        tracing::debug!(
            "🗜️ Compacted {} memory entries of note '{}'",
            old.len(),
            note.id
        );
        true
    }
}

fn fallback_digest(count: usize) -> String {
    format!("{count} earlier entries compacted")
}

fn summary_prompt(title: &str, entries: &[MemoryEntry]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|e| {
            let content = match &e.content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let content: String = content.chars().take(MAX_ENTRY_CHARS).collect();
            match &e.step_id {
                Some(step) => format!("- [{:?} {step}] {content}", e.entry_type),
                None => format!("- [{:?}] {content}", e.entry_type),
            }
        })
        .collect();
    format!(
        "Summarize the execution history of note \"{title}\" in a few sentences:\n{}",
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FailingGenerator;
    use notefabric_providers::OfflineGenerator;

    fn config() -> MemoryConfig {
        MemoryConfig {
            eviction_threshold: 10,
            retained_tail: 4,
        }
    }

    fn note_with(entries: usize) -> Note {
        let mut note = Note::new("log");
        for i in 0..entries {
            note.push_memory(MemoryEntry::system(&format!("entry {i}")));
        }
        note
    }

    #[tokio::test]
    async fn test_under_threshold_untouched() {
        let evictor = MemoryEvictor::new(&config(), Arc::new(OfflineGenerator::new()));
        let mut note = note_with(10);
        assert!(!evictor.evict(&mut note).await);
        assert_eq!(note.memory.len(), 10);
    }

    #[tokio::test]
    async fn test_bound_and_summary_first() {
        let evictor = MemoryEvictor::new(&config(), Arc::new(OfflineGenerator::new()));
        let mut note = note_with(11);
        assert!(evictor.evict(&mut note).await);
        assert_eq!(note.memory.len(), 5);
        assert_eq!(note.memory[0].entry_type, MemoryEntryType::Summary);
        assert_eq!(note.memory[0].content["compacted"], 7);
        assert_eq!(note.memory[1].content, "entry 7");
        assert_eq!(note.memory[4].content, "entry 10");

        // A compacted log that grows again is folded back to the bound.
        note.push_memory(MemoryEntry::system("entry 11"));
        assert!(evictor.evict(&mut note).await);
        assert_eq!(note.memory.len(), 5);
        assert_eq!(note.memory[0].entry_type, MemoryEntryType::Summary);
        assert_eq!(note.memory[4].content, "entry 11");
    }

    #[tokio::test]
    async fn test_generator_failure_uses_digest() {
        let evictor = MemoryEvictor::new(&config(), Arc::new(FailingGenerator));
        let mut note = note_with(12);
        assert!(evictor.evict(&mut note).await);
        assert_eq!(note.memory[0].content["summary"], "8 earlier entries compacted");
    }

    #[tokio::test]
    async fn test_tail_not_below_threshold_is_clamped() {
        let config = MemoryConfig {
            eviction_threshold: 4,
            retained_tail: 10,
        };
        let evictor = MemoryEvictor::new(&config, Arc::new(OfflineGenerator::new()));
        let mut note = note_with(6);
        assert!(evictor.evict(&mut note).await);
        assert_eq!(note.memory.len(), 4);
        assert_eq!(note.memory[0].entry_type, MemoryEntryType::Summary);
        assert_eq!(note.memory[0].content["compacted"], 3);
    }
}
