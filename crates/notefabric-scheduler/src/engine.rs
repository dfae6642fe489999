//! Fabric engine: wires the graph store, registry, coalescer, scheduler
//! and runner together and drives the tick and re-rank loops.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use notefabric_core::config::FabricConfig;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::protocol::OutboundMessage;
use notefabric_core::traits::{NoteStorage, TextGenerator};
use notefabric_core::types::{MAX_PRIORITY, Note, NoteStatus, StepStatus, ToolDefinition};
use notefabric_graph::GraphStore;
use notefabric_tools::ToolRegistry;
use serde_json::{Map, Value, json};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;

use crate::analytics::UsageAnalytics;
use crate::coalescer::{WriteCoalescer, WriteReceipt};
use crate::events::EventBus;
use crate::hooks::TestHook;
use crate::runner::{RunnerParts, StepRunner};
use crate::scheduler::Scheduler;

/// Fields a client update never writes. `status` is handled separately:
/// a client may only ask for a rerun with `"pending"`.
const ENGINE_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "status",
    "memory",
    "tests",
    "retryCount",
    "testTarget",
];
/// How long shutdown waits for in-flight runs before the final flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct FabricEngine {
    config: FabricConfig,
    graph: Arc<GraphStore>,
    registry: Arc<ToolRegistry>,
    storage: Arc<dyn NoteStorage>,
    events: EventBus,
    coalescer: WriteCoalescer,
    scheduler: Arc<Scheduler>,
    analytics: Arc<UsageAnalytics>,
    runner: Arc<StepRunner>,
    permits: Arc<Semaphore>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl FabricEngine {
    pub fn new(
        config: FabricConfig,
        storage: Arc<dyn NoteStorage>,
        registry: Arc<ToolRegistry>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self::with_test_hooks(config, storage, registry, generator, Vec::new())
    }

    pub fn with_test_hooks(
        config: FabricConfig,
        storage: Arc<dyn NoteStorage>,
        registry: Arc<ToolRegistry>,
        generator: Arc<dyn TextGenerator>,
        hooks: Vec<Arc<dyn TestHook>>,
    ) -> Self {
        let graph = Arc::new(GraphStore::new());
        let events = EventBus::default();
        let coalescer = WriteCoalescer::new(
            graph.clone(),
            storage.clone(),
            events.clone(),
            config.persistence.flush_interval(),
        );
        let scheduler = Arc::new(Scheduler::new(config.scheduler.max_admitted_per_cycle));
        let analytics = Arc::new(UsageAnalytics::new());
        let parts = RunnerParts {
            graph: graph.clone(),
            registry: registry.clone(),
            coalescer: coalescer.clone(),
            scheduler: scheduler.clone(),
            analytics: analytics.clone(),
            generator,
        };
        let runner = Arc::new(StepRunner::new(parts, &config).with_hooks(hooks));
        let permits = Arc::new(Semaphore::new(config.scheduler.max_concurrent_runs.max(1)));

        Self {
            config,
            graph,
            registry,
            storage,
            events,
            coalescer,
            scheduler,
            analytics,
            runner,
            permits,
            loops: Mutex::new(Vec::new()),
        }
    }

    fn loops(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load every stored note into the graph and admit the runnable ones.
    /// Returns the number of notes admitted.
    pub async fn bootstrap(&self) -> Result<usize> {
        let notes = self.storage.load().await?;
        let count = notes.len();
        let mut admitted = 0;
        for note in notes {
            let id = note.id.clone();
            let runnable = matches!(note.status, NoteStatus::Pending | NoteStatus::Running);
            self.graph.add_note(note);
            if runnable && self.scheduler.admit(&id) {
                admitted += 1;
            }
        }
        tracing::info!(
            "📂 Loaded {count} note(s) from {} storage, {admitted} runnable",
            self.storage.name()
        );
        Ok(admitted)
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn runner(&self) -> &Arc<StepRunner> {
        &self.runner
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.events.subscribe()
    }

    pub fn get_note(&self, id: &str) -> Option<Note> {
        self.graph.get_note(id)
    }

    /// All notes, oldest first.
    pub fn snapshot(&self) -> Vec<Note> {
        let mut notes = self.graph.get_notes();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        notes
    }

    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    fn publish_snapshot(&self) {
        self.events
            .publish(OutboundMessage::Notes { data: self.snapshot() });
    }

    pub fn create_note(&self, title: &str) -> Note {
        self.insert_note(Note::new(title))
    }

    /// Add a fully-formed note (logic, references, ...) to the fabric.
    pub fn insert_note(&self, mut note: Note) -> Note {
        note.priority = note.priority.min(MAX_PRIORITY);
        let graph = &self.graph;
        note.references.retain(|target| graph.contains(target));
        let id = note.id.clone();
        let pending = note.status == NoteStatus::Pending;

        self.graph.add_note(note.clone());
        let _ = self.coalescer.request_write(&id);
        if pending {
            self.scheduler.admit(&id);
        }
        tracing::info!("📝 Note created: '{}' ({id})", note.title);
        self.publish_snapshot();
        self.graph.get_note(&id).unwrap_or(note)
    }

    /// Merge client-provided fields into a note under the graph lock.
    ///
    /// Engine-owned fields are ignored. `status` may only be `"pending"`,
    /// which reruns the note from scratch; any other value is rejected.
    /// Step statuses are kept for known step ids and start pending for new
    /// ones, and a completed note that gains unfinished steps reopens.
    /// While a note is running its `status` and `logic` are locked.
    pub fn update_note(&self, id: &str, fields: &Map<String, Value>) -> Result<Note> {
        let runner = &self.runner;
        let mut previous_refs = Vec::new();
        let updated = self.graph.try_update_note(id, |note| {
            let rerun = match fields.get("status") {
                None => false,
                Some(value) if value.as_str() == Some("pending") => true,
                Some(other) => {
                    return Err(invalid_update(
                        id,
                        format!("status {other} is set by the engine, only \"pending\" may be requested"),
                    ));
                }
            };
            if (rerun || fields.contains_key("logic")) && runner.is_in_flight(id) {
                return Err(invalid_update(
                    id,
                    "note is running, status and logic are locked until the run ends".into(),
                ));
            }

            let mut merged = serde_json::to_value(&*note)?;
            if let Some(object) = merged.as_object_mut() {
                for (key, value) in fields {
                    if !ENGINE_FIELDS.contains(&key.as_str()) {
                        object.insert(key.clone(), value.clone());
                    }
                }
            }
            let mut next: Note = serde_json::from_value(merged)?;
            next.priority = next.priority.min(MAX_PRIORITY);
            for step in &mut next.logic {
                match note.step(&step.id) {
                    Some(known) => {
                        step.status = known.status;
                        step.error = known.error.clone();
                    }
                    None => {
                        step.status = StepStatus::Pending;
                        step.error = None;
                    }
                }
            }
            if rerun {
                next.status = NoteStatus::Pending;
                next.retry_count = 0;
                for step in &mut next.logic {
                    step.status = StepStatus::Pending;
                    step.error = None;
                }
            } else if next.status == NoteStatus::Completed && !next.all_steps_completed() {
                next.status = NoteStatus::Pending;
            }

            previous_refs = std::mem::take(&mut note.references);
            *note = next;
            Ok(())
        })?;

        let _ = self.coalescer.request_write(id);
        if updated.status == NoteStatus::Pending {
            self.scheduler.admit(id);
        }
        if updated.references != previous_refs {
            self.publish_snapshot();
        }
        tracing::debug!("✏️ Note updated: {id}");
        Ok(updated)
    }

    /// Delete a note and sever every edge pointing at it.
    /// Returns the ids of notes whose references were pruned.
    pub async fn delete_note(&self, id: &str) -> Result<Vec<String>> {
        if !self.graph.contains(id) {
            return Err(FabricError::NoteNotFound(id.to_string()));
        }
        let pruned = self.graph.remove_note(id);
        self.scheduler.remove(id);
        self.analytics.remove(id);

        if let Err(e) = self.storage.delete(id).await {
            tracing::warn!("⚠️ Failed to delete stored note '{id}': {e}");
        }
        if let Err(e) = self.storage.remove_references_to(id).await {
            tracing::warn!("⚠️ Failed to prune stored references to '{id}': {e}");
        }
        for source in &pruned {
            let _ = self.coalescer.request_write(source);
        }
        tracing::info!("🗑️ Note deleted: {id} ({} reference(s) pruned)", pruned.len());
        self.publish_snapshot();
        Ok(pruned)
    }

    /// Wait for the next flush that includes `id`.
    pub fn persist(&self, id: &str) -> WriteReceipt {
        self.coalescer.request_write(id)
    }

    /// Dispatch runnable notes while worker permits are available.
    /// Returns the number of runs started.
    pub fn tick(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(id) = self.scheduler.next() else {
                break;
            };
            let Some(note) = self.graph.get_note(&id) else {
                continue;
            };
            if !matches!(note.status, NoteStatus::Pending | NoteStatus::Running) {
                tracing::debug!("⏭️ Note '{id}' is {}, not dispatching", note.status);
                continue;
            }

            let runner = self.runner.clone();
            let run = tokio::spawn(async move {
                let _permit = permit;
                runner.run(note).await;
            });
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                if let Err(e) = run.await
                    && e.is_panic()
                {
                    tracing::warn!("💥 Run of note '{id}' panicked, re-admitting");
                    scheduler.admit(&id);
                }
            });
            dispatched += 1;
        }
        dispatched
    }

    /// Recompute priorities and admit the top notes.
    pub fn rerank(&self) -> Vec<String> {
        self.scheduler
            .rerank(&self.graph.get_notes(), &self.analytics, Utc::now())
    }

    /// Start the tick and re-rank loops. Calling it twice is a no-op.
    pub fn spawn(self: &Arc<Self>) {
        let mut loops = self.loops();
        if !loops.is_empty() {
            return;
        }

        let tick_every = self.config.scheduler.tick_interval();
        let engine = self.clone();
        loops.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_every);
            loop {
                interval.tick().await;
                engine.tick();
            }
        }));

        let rerank_every = self.config.scheduler.rerank_interval();
        let engine = self.clone();
        loops.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(rerank_every);
            loop {
                interval.tick().await;
                engine.rerank();
            }
        }));

        tracing::info!(
            "⏰ Engine started (tick {}ms, re-rank {}ms, {} worker(s))",
            tick_every.as_millis(),
            rerank_every.as_millis(),
            self.config.scheduler.max_concurrent_runs
        );
    }

    /// Stop the loops, let in-flight runs finish, and flush pending writes.
    pub async fn shutdown(&self) {
        for handle in self.loops().drain(..) {
            handle.abort();
        }
        let workers = self.config.scheduler.max_concurrent_runs.max(1) as u32;
        match tokio::time::timeout(SHUTDOWN_GRACE, self.permits.acquire_many(workers)).await {
            Ok(Ok(_all)) => {}
            _ => tracing::warn!("⚠️ Shutdown grace elapsed with runs still in flight"),
        }
        let flushed = self.coalescer.flush_now().await;
        tracing::info!("👋 Engine stopped ({flushed} note(s) flushed)");
    }

    /// Counters for the health endpoint.
    pub fn status(&self) -> Value {
        json!({
            "notes": self.graph.size(),
            "queued": self.scheduler.len(),
            "inFlight": self.runner.in_flight_count(),
            "pendingWrites": self.coalescer.pending_ids().len(),
            "storage": self.storage.name(),
            "usage": self.analytics.summary(),
        })
    }
}

fn invalid_update(note_id: &str, message: String) -> FabricError {
    FabricError::InvalidUpdate {
        note_id: note_id.to_string(),
        message,
    }
}
