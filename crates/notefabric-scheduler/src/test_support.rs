//! Fakes and a wired-up runner for the engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notefabric_core::config::FabricConfig;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::{TextGenerator, Tool, ToolContext};
use notefabric_core::types::{Note, ToolDefinition};
use notefabric_graph::{GraphStore, MemoryStorage};
use notefabric_providers::OfflineGenerator;
use notefabric_tools::ToolRegistry;
use serde_json::{Value, json};

use crate::analytics::UsageAnalytics;
use crate::coalescer::WriteCoalescer;
use crate::events::EventBus;
use crate::hooks::TestHook;
use crate::runner::{RunnerParts, StepRunner};
use crate::scheduler::Scheduler;

fn definition(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!("test tool {name}"),
        input_schema: json!({"type": "object"}),
    }
}

/// Order in which tools were invoked.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Returns a fixed output, or echoes its input when none is set.
pub struct RecordingTool {
    name: String,
    output: Option<Value>,
    log: CallLog,
}

impl RecordingTool {
    pub fn new(name: &str, output: Value, log: CallLog) -> Self {
        Self {
            name: name.into(),
            output: Some(output),
            log,
        }
    }

    pub fn echoing(name: &str, log: CallLog) -> Self {
        Self {
            name: name.into(),
            output: None,
            log,
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        definition(&self.name)
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<Value> {
        self.log.push(&self.name);
        Ok(self.output.clone().unwrap_or(input))
    }
}

pub struct ErrorTool {
    name: String,
    message: String,
}

impl ErrorTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Tool for ErrorTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        definition(&self.name)
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        Err(FabricError::Other(self.message.clone()))
    }
}

/// Sleeps before answering and counts invocations.
pub struct SlowTool {
    name: String,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        definition(&self.name)
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(json!({"slept_ms": self.delay.as_millis() as u64}))
    }
}

/// Tool whose execution panics.
pub struct PanicTool {
    name: String,
}

impl PanicTool {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        definition(&self.name)
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<Value> {
        panic!("tool {} blew up", self.name);
    }
}

pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _prompt: &str, _context_ids: &[String]) -> Result<String> {
        Err(FabricError::Provider("generator offline".into()))
    }

    async fn fetch_external(&self, _source: &str, _query: &str) -> Result<Value> {
        Err(FabricError::Provider("generator offline".into()))
    }
}

pub struct StaticHook {
    name: String,
    pass: bool,
}

impl StaticHook {
    pub fn passing(name: &str) -> Self {
        Self { name: name.into(), pass: true }
    }

    pub fn failing(name: &str) -> Self {
        Self { name: name.into(), pass: false }
    }
}

#[async_trait]
impl TestHook for StaticHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, note: &Note, _ctx: &ToolContext) -> Result<Value> {
        if self.pass {
            Ok(json!({"checked": note.id}))
        } else {
            Err(FabricError::Other("assertion failed".into()))
        }
    }
}

pub fn tool_context() -> ToolContext {
    ToolContext::new(Arc::new(GraphStore::new()), Arc::new(OfflineGenerator::new()))
}

/// Runner wired to in-memory collaborators with a short flush interval.
pub struct Fixture {
    pub graph: Arc<GraphStore>,
    pub storage: Arc<MemoryStorage>,
    pub scheduler: Arc<Scheduler>,
    pub events: EventBus,
    pub parts: RunnerParts,
    pub config: FabricConfig,
    pub runner: StepRunner,
}

impl Fixture {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self::with_config(tools, FabricConfig::default())
    }

    pub fn with_timeout(tools: Vec<Arc<dyn Tool>>, timeout: Duration) -> Self {
        let mut fx = Self::new(tools);
        fx.runner = fx.rebuild_runner(|r| r.with_step_timeout(timeout));
        fx
    }

    pub fn with_config(tools: Vec<Arc<dyn Tool>>, mut config: FabricConfig) -> Self {
        config.persistence.flush_interval_ms = 5;
        let mut registry = ToolRegistry::with_defaults();
        registry.register_many(tools).unwrap();

        let graph = Arc::new(GraphStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let events = EventBus::default();
        let scheduler = Arc::new(Scheduler::new(config.scheduler.max_admitted_per_cycle));
        let parts = RunnerParts {
            graph: graph.clone(),
            registry: Arc::new(registry),
            coalescer: WriteCoalescer::new(
                graph.clone(),
                storage.clone(),
                events.clone(),
                config.persistence.flush_interval(),
            ),
            scheduler: scheduler.clone(),
            analytics: Arc::new(UsageAnalytics::new()),
            generator: Arc::new(OfflineGenerator::new()),
        };
        let runner = StepRunner::new(parts.clone(), &config);
        Self {
            graph,
            storage,
            scheduler,
            events,
            parts,
            config,
            runner,
        }
    }

    pub fn rebuild_runner(&self, f: impl FnOnce(StepRunner) -> StepRunner) -> StepRunner {
        f(StepRunner::new(self.parts.clone(), &self.config))
    }

    pub fn insert(&self, note: Note) -> Note {
        self.graph.add_note(note.clone());
        note
    }
}
