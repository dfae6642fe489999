//! `${stepId}` substitution of prior step outputs into step input.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use notefabric_core::types::{MemoryEntry, MemoryEntryType};
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"));

/// Outputs already recorded in a note's memory, keyed by step id.
/// Entries written without a step id are keyed by their epoch-millis timestamp.
pub fn resumed_outputs(memory: &[MemoryEntry]) -> HashMap<String, Value> {
    memory
        .iter()
        .filter(|e| e.entry_type == MemoryEntryType::StepResult)
        .map(|e| {
            let key = match &e.step_id {
                Some(id) => id.clone(),
                None => legacy_key(&e.timestamp),
            };
            (key, e.content.clone())
        })
        .collect()
}

fn legacy_key(ts: &DateTime<Utc>) -> String {
    ts.timestamp_millis().to_string()
}

/// Replace placeholders anywhere in `input`.
///
/// A string that is exactly one placeholder becomes the referenced value
/// itself; embedded placeholders are spliced in as text. Unknown ids are
/// left untouched.
pub fn substitute(input: &Value, outputs: &HashMap<String, Value>) -> Value {
    match input {
        Value::String(s) => substitute_str(s, outputs),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, outputs)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, outputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(s: &str, outputs: &HashMap<String, Value>) -> Value {
    if let Some(caps) = PLACEHOLDER.captures(s)
        && caps.get(0).is_some_and(|m| m.as_str() == s)
        && let Some(value) = outputs.get(&caps[1])
    {
        return value.clone();
    }
    let replaced = PLACEHOLDER.replace_all(s, |caps: &Captures| match outputs.get(&caps[1]) {
        Some(Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}
