//! Per-note usage counters, read by the re-rank loop.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteUsage {
    pub run_count: u64,
    pub completed_count: u64,
    pub failure_count: u64,
    pub total_duration: Duration,
    pub last_duration: Duration,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct UsageAnalytics {
    usage: Mutex<HashMap<String, NoteUsage>>,
}

impl UsageAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NoteUsage>> {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_start(&self, note_id: &str) {
        let mut usage = self.lock();
        let entry = usage.entry(note_id.to_string()).or_default();
        entry.run_count += 1;
        entry.last_run = Some(Utc::now());
    }

    /// Close a run. `completed` is false for runs that went through the failure policy.
    pub fn record_finish(&self, note_id: &str, elapsed: Duration, completed: bool) {
        let mut usage = self.lock();
        let entry = usage.entry(note_id.to_string()).or_default();
        entry.total_duration += elapsed;
        entry.last_duration = elapsed;
        if completed {
            entry.completed_count += 1;
        }
    }

    pub fn record_failure(&self, note_id: &str) {
        self.lock().entry(note_id.to_string()).or_default().failure_count += 1;
    }

    pub fn failure_count(&self, note_id: &str) -> u64 {
        self.lock().get(note_id).map(|u| u.failure_count).unwrap_or(0)
    }

    pub fn get(&self, note_id: &str) -> Option<NoteUsage> {
        self.lock().get(note_id).cloned()
    }

    pub fn remove(&self, note_id: &str) {
        self.lock().remove(note_id);
    }

    /// Aggregate view for status endpoints.
    pub fn summary(&self) -> Value {
        let usage = self.lock();
        let runs: u64 = usage.values().map(|u| u.run_count).sum();
        let failures: u64 = usage.values().map(|u| u.failure_count).sum();
        let total_ms: u128 = usage.values().map(|u| u.total_duration.as_millis()).sum();
        json!({
            "notes": usage.len(),
            "runs": runs,
            "failures": failures,
            "avgRunMs": if runs == 0 { 0 } else { (total_ms / runs as u128) as u64 },
        })
    }
}
