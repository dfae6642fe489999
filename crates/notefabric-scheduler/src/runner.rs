//! Step runner: executes one note's step graph.
//!
//! At most one run per note id is in flight; a second `run` of the same
//! note returns it unchanged. Steps run one at a time in ready-queue order.
//! Every mutation is merged into the live note and handed to the write
//! coalescer. A run owns the note's status, step statuses, memory, tests and
//! retry count; client edits to anything else survive the run. A note
//! deleted mid-run is never written back.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use notefabric_core::config::FabricConfig;
use notefabric_core::error::FabricError;
use notefabric_core::traits::{NoteReader, TextGenerator, ToolContext};
use notefabric_core::types::{MemoryEntry, MemoryEntryType, Note, NoteStatus, StepStatus};
use notefabric_graph::GraphStore;
use notefabric_tools::ToolRegistry;
use serde_json::{Value, json};

use crate::analytics::UsageAnalytics;
use crate::coalescer::WriteCoalescer;
use crate::evictor::MemoryEvictor;
use crate::failure::{FailureDecision, FailurePolicy, TESTS_RELATIONSHIP};
use crate::graph::StepGraph;
use crate::hooks::TestHook;
use crate::placeholders::{resumed_outputs, substitute};
use crate::scheduler::Scheduler;

/// Shared components a runner is wired to.
#[derive(Clone)]
pub struct RunnerParts {
    pub graph: Arc<GraphStore>,
    pub registry: Arc<ToolRegistry>,
    pub coalescer: WriteCoalescer,
    pub scheduler: Arc<Scheduler>,
    pub analytics: Arc<UsageAnalytics>,
    pub generator: Arc<dyn TextGenerator>,
}

/// Removes the note id from the in-flight set on drop, including on panic.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    /// Check-and-set under one lock.
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        inserted.then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Why a run ended before reaching its post-processing.
enum Halt {
    /// The note vanished from the graph.
    Deleted,
    Failed(FabricError),
}

pub struct StepRunner {
    graph: Arc<GraphStore>,
    registry: Arc<ToolRegistry>,
    coalescer: WriteCoalescer,
    scheduler: Arc<Scheduler>,
    analytics: Arc<UsageAnalytics>,
    policy: FailurePolicy,
    evictor: MemoryEvictor,
    hooks: Vec<Arc<dyn TestHook>>,
    run_tests: bool,
    step_timeout: Duration,
    ctx: ToolContext,
    in_flight: Mutex<HashSet<String>>,
}

impl StepRunner {
    pub fn new(parts: RunnerParts, config: &FabricConfig) -> Self {
        let reader: Arc<dyn NoteReader> = parts.graph.clone();
        Self {
            ctx: ToolContext::new(reader, parts.generator.clone()),
            evictor: MemoryEvictor::new(&config.memory, parts.generator),
            policy: FailurePolicy::new(&config.failure),
            hooks: Vec::new(),
            run_tests: config.tests.auto_run,
            step_timeout: config.scheduler.step_timeout(),
            graph: parts.graph,
            registry: parts.registry,
            coalescer: parts.coalescer,
            scheduler: parts.scheduler,
            analytics: parts.analytics,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn TestHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self, note_id: &str) -> bool {
        self.in_flight().contains(note_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    /// Run a note to completion, failure or hand-off. Returns the note as
    /// it stands afterwards.
    pub async fn run(&self, note: Note) -> Note {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, &note.id) else {
            tracing::debug!("⏭️ Note '{}' already running, skipping", note.id);
            return note;
        };
        // Run against the live copy; the caller's may be stale.
        let Some(current) = self.graph.get_note(&note.id) else {
            return note;
        };

        let mut readmit = Vec::new();
        let result = self.execute(current, &mut readmit).await;
        drop(guard);

        // Re-admission only after the in-flight marker is cleared, so the
        // next tick can actually pick the note up.
        for id in readmit {
            self.scheduler.admit(&id);
        }
        result
    }

    async fn execute(&self, mut note: Note, readmit: &mut Vec<String>) -> Note {
        let started = Instant::now();
        tracing::info!("▶️ Running note '{}' ({})", note.title, note.id);

        note.status = NoteStatus::Running;
        // Steps left running by an interrupted process never finished.
        for step in &mut note.logic {
            if step.status == StepStatus::Running {
                step.status = StepStatus::Pending;
            }
        }
        if !self.commit(&mut note) {
            return note;
        }
        self.analytics.record_start(&note.id);

        let outcome = self.run_steps(&mut note).await;
        let completed = match outcome {
            Ok(()) => {
                note.status = NoteStatus::Completed;
                note.retry_count = 0;
                tracing::info!("✅ Note '{}' completed", note.id);
                if !self.commit(&mut note) {
                    return note;
                }
                self.run_test_hooks(&mut note).await;
                true
            }
            Err(Halt::Deleted) => {
                tracing::info!("🗑️ Note '{}' deleted mid-run, dropping results", note.id);
                return note;
            }
            Err(Halt::Failed(error)) => {
                self.handle_failure(&mut note, &error, readmit);
                false
            }
        };

        self.evictor.evict(&mut note).await;
        self.commit(&mut note);
        self.analytics
            .record_finish(&note.id, started.elapsed(), completed);
        note
    }

    async fn run_steps(&self, note: &mut Note) -> Result<(), Halt> {
        let mut graph = match StepGraph::build(note) {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!("⚠️ Note '{}' has an invalid step graph: {e}", note.id);
                note.push_memory(MemoryEntry::new(MemoryEntryType::Error, json!(e.to_string())));
                return Err(Halt::Failed(e));
            }
        };
        let mut outputs = resumed_outputs(&note.memory);
        let mut ready: VecDeque<String> = graph.initial_ready(note);

        while let Some(step_id) = ready.pop_front() {
            let Some(step) = note.step_mut(&step_id) else {
                continue;
            };
            if step.status != StepStatus::Pending {
                continue;
            }
            step.status = StepStatus::Running;
            let tool = step.tool.clone();
            let input = substitute(&step.input, &outputs);
            if !self.commit(note) {
                return Err(Halt::Deleted);
            }

            tracing::debug!("🔧 Step '{step_id}' → {tool}");
            let result = self.dispatch(&note.id, &step_id, &tool, input).await;
            match result {
                Ok(output) => {
                    if let Some(step) = note.step_mut(&step_id) {
                        step.status = StepStatus::Completed;
                        step.error = None;
                    }
                    note.push_memory(MemoryEntry::step_result(&step_id, output.clone()));
                    outputs.insert(step_id.clone(), output);
                    if !self.commit(note) {
                        return Err(Halt::Deleted);
                    }
                    ready.extend(graph.complete(&step_id));
                }
                Err(e) => {
                    tracing::warn!("❌ Step '{step_id}' of note '{}' failed: {e}", note.id);
                    if let Some(step) = note.step_mut(&step_id) {
                        step.status = StepStatus::Failed;
                        step.error = Some(e.to_string());
                    }
                    note.push_memory(MemoryEntry::step_error(&step_id, &e.to_string()));
                    if !self.commit(note) {
                        return Err(Halt::Deleted);
                    }
                    return Err(Halt::Failed(e));
                }
            }
        }

        let unfinished: Vec<String> = note
            .logic
            .iter()
            .filter(|s| s.status != StepStatus::Completed)
            .map(|s| format!("{} ({})", s.id, s.status))
            .collect();
        if unfinished.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            "⚠️ Note '{}' left steps unfinished: {}",
            note.id,
            unfinished.join(", ")
        );
        let error = FabricError::NoteExecution {
            note_id: note.id.clone(),
            message: format!("steps never became ready: {}", unfinished.join(", ")),
        };
        note.push_memory(MemoryEntry::new(MemoryEntryType::Error, json!(error.message())));
        Err(Halt::Failed(error))
    }

    async fn dispatch(
        &self,
        note_id: &str,
        step_id: &str,
        tool: &str,
        input: Value,
    ) -> notefabric_core::error::Result<Value> {
        let ctx = self.ctx.for_step(note_id, step_id);
        match tokio::time::timeout(self.step_timeout, self.registry.execute(tool, input, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(FabricError::Timeout(format!(
                "step '{step_id}' ({tool}) exceeded {}ms",
                self.step_timeout.as_millis()
            ))),
        }
    }

    fn handle_failure(&self, note: &mut Note, error: &FabricError, readmit: &mut Vec<String>) {
        self.analytics.record_failure(&note.id);
        match self.policy.decide(note, error) {
            FailureDecision::Retry => {
                tracing::info!("🔁 Retrying note '{}': {}", note.id, error.message());
                self.policy.retry(note, error);
                readmit.push(note.id.clone());
            }
            FailureDecision::Escalate => {
                let test = self.policy.escalate(note, error);
                tracing::info!(
                    "🧪 Note '{}' escalated to unit test '{}'",
                    note.id,
                    test.id
                );
                let test_id = test.id.clone();
                self.graph.add_note(test);
                if let Err(e) = self.graph.add_edge(&test_id, &note.id, TESTS_RELATIONSHIP) {
                    tracing::warn!("⚠️ Could not link unit test '{test_id}': {e}");
                }
                let _ = self.coalescer.request_write(&test_id);
                readmit.push(test_id);
            }
            FailureDecision::Fail => {
                tracing::warn!("💥 Note '{}' failed: {}", note.id, error.message());
                self.policy.fail(note, error);
            }
        }
    }

    async fn run_test_hooks(&self, note: &mut Note) {
        if !self.run_tests || self.hooks.is_empty() {
            return;
        }
        let ctx = self.ctx.for_step(&note.id, "tests");
        for hook in &self.hooks {
            let content = match hook.run(note, &ctx).await {
                Ok(output) => json!({ "hook": hook.name(), "passed": true, "output": output }),
                Err(e) => {
                    tracing::warn!("⚠️ Test hook '{}' failed on note '{}': {e}", hook.name(), note.id);
                    json!({ "hook": hook.name(), "passed": false, "error": e.to_string() })
                }
            };
            note.push_memory(MemoryEntry::new(MemoryEntryType::TestResult, content));
        }
    }

    /// Merge the run state into the live note and refresh our copy from it.
    /// Returns false if the note was deleted.
    fn commit(&self, note: &mut Note) -> bool {
        let run: &Note = note;
        match self
            .graph
            .try_update_note(&run.id, |live| {
                apply_run_state(live, run);
                Ok(())
            }) {
            Ok(merged) => {
                let _ = self.coalescer.request_write(&merged.id);
                *note = merged;
                true
            }
            Err(_) => false,
        }
    }
}

/// Copy the fields a run owns onto the live note. Everything else
/// (title, content, priority, deadline, references, step inputs) stays as
/// clients last left it.
fn apply_run_state(live: &mut Note, run: &Note) {
    live.status = run.status;
    live.memory = run.memory.clone();
    live.tests = run.tests.clone();
    live.retry_count = run.retry_count;
    for step in &mut live.logic {
        if let Some(ours) = run.step(&step.id) {
            step.status = ours.status;
            step.error = ours.error.clone();
        }
    }
}
