//! Runnable set and priority ranking.
//!
//! The runnable set is FIFO with set semantics: admitting an id that is
//! already queued is a no-op. Re-ranking only reads note state and usage
//! counters; it never runs anything itself.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use notefabric_core::types::{Note, NoteStatus};

use crate::analytics::UsageAnalytics;

/// Subtracted from overdue notes. Larger than any finite deadline bonus.
pub const OVERDUE_PENALTY: f64 = 150.0;
/// Ceiling for the deadline bonus, reached as the deadline approaches.
pub const DEADLINE_WEIGHT: f64 = 100.0;
const FAILURE_WEIGHT: f64 = 2.0;
const MAX_FAILURE_PENALTY: f64 = 20.0;

#[derive(Default)]
struct RunQueue {
    order: VecDeque<String>,
    queued: HashSet<String>,
}

pub struct Scheduler {
    queue: Mutex<RunQueue>,
    max_admitted_per_cycle: usize,
}

impl Scheduler {
    pub fn new(max_admitted_per_cycle: usize) -> Self {
        Self {
            queue: Mutex::new(RunQueue::default()),
            max_admitted_per_cycle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a note id to the runnable set. Returns false if it was already queued.
    pub fn admit(&self, note_id: &str) -> bool {
        let mut queue = self.lock();
        if !queue.queued.insert(note_id.to_string()) {
            return false;
        }
        queue.order.push_back(note_id.to_string());
        true
    }

    pub fn next(&self) -> Option<String> {
        let mut queue = self.lock();
        let id = queue.order.pop_front()?;
        queue.queued.remove(&id);
        Some(id)
    }

    pub fn remove(&self, note_id: &str) -> bool {
        let mut queue = self.lock();
        if !queue.queued.remove(note_id) {
            return false;
        }
        queue.order.retain(|id| id != note_id);
        true
    }

    pub fn contains(&self, note_id: &str) -> bool {
        self.lock().queued.contains(note_id)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    pub fn queued(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }

    /// Priority score of a note at `now`; higher runs first.
    ///
    /// `priority + 100 / (1 + hoursLeft)` before the deadline,
    /// `priority - 150` once it has passed, then minus a capped
    /// penalty for recorded failures.
    pub fn score(note: &Note, now: DateTime<Utc>, failure_count: u64) -> f64 {
        let mut score = f64::from(note.priority);
        if let Some(deadline) = note.deadline {
            let secs_left = (deadline - now).num_milliseconds() as f64 / 1000.0;
            if secs_left > 0.0 {
                let hours_left = secs_left / 3600.0;
                score += DEADLINE_WEIGHT / (1.0 + hours_left);
            } else {
                score -= OVERDUE_PENALTY;
            }
        }
        score - (FAILURE_WEIGHT * failure_count as f64).min(MAX_FAILURE_PENALTY)
    }

    /// Score every pending or running note and admit the top N.
    /// Returns the admitted ids in score order (already-queued ones included).
    pub fn rerank(&self, notes: &[Note], analytics: &UsageAnalytics, now: DateTime<Utc>) -> Vec<String> {
        let mut ranked: Vec<(f64, &Note)> = notes
            .iter()
            .filter(|n| matches!(n.status, NoteStatus::Pending | NoteStatus::Running))
            .map(|n| (Self::score(n, now, analytics.failure_count(&n.id)), n))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.created_at.cmp(&b.1.created_at))
        });

        let top: Vec<String> = ranked
            .into_iter()
            .take(self.max_admitted_per_cycle)
            .map(|(_, n)| n.id.clone())
            .collect();
        for id in &top {
            self.admit(id);
        }
        if !top.is_empty() {
            tracing::debug!("📊 Re-rank admitted {} note(s)", top.len());
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_admit_is_idempotent_and_fifo() {
        let scheduler = Scheduler::new(5);
        assert!(scheduler.admit("a"));
        assert!(scheduler.admit("b"));
        assert!(!scheduler.admit("a"));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.next().as_deref(), Some("a"));
        assert!(scheduler.admit("a"));
        assert_eq!(scheduler.queued(), vec!["b".to_string(), "a".to_string()]);
        assert!(scheduler.remove("b"));
        assert_eq!(scheduler.next().as_deref(), Some("a"));
        assert!(scheduler.next().is_none());
    }

    #[test]
    fn test_deadline_outranks_plain_priority() {
        let now = Utc::now();
        let a = Note::new("A").with_deadline(now + Duration::hours(1));
        let b = Note::new("B");
        assert!(Scheduler::score(&a, now, 0) > Scheduler::score(&b, now, 0));
        // Just before the deadline the bonus approaches its ceiling.
        let almost = now + Duration::hours(1) - Duration::seconds(1);
        assert!(Scheduler::score(&a, almost, 0) > 149.0);
    }

    #[test]
    fn test_overdue_and_failure_penalties() {
        let now = Utc::now();
        let overdue = Note::new("late").with_deadline(now - Duration::minutes(5));
        assert_eq!(Scheduler::score(&overdue, now, 0), 50.0 - OVERDUE_PENALTY);
        let plain = Note::new("plain");
        assert_eq!(Scheduler::score(&plain, now, 3), 44.0);
        assert_eq!(Scheduler::score(&plain, now, 100), 30.0);
    }

    #[test]
    fn test_rerank_admits_top_n_runnable() {
        let scheduler = Scheduler::new(2);
        let analytics = UsageAnalytics::new();
        let low = Note::new("low").with_priority(10);
        let high = Note::new("high").with_priority(90);
        let mid = Note::new("mid").with_priority(50);
        let mut done = Note::new("done").with_priority(100);
        done.status = NoteStatus::Completed;

        let notes = vec![low, high.clone(), mid.clone(), done];
        let admitted = scheduler.rerank(&notes, &analytics, Utc::now());
        assert_eq!(admitted, vec![high.id.clone(), mid.id.clone()]);
        assert_eq!(scheduler.next(), Some(high.id));
    }
}
