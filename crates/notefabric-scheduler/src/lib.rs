//! # NoteFabric Scheduler
//!
//! The execution engine: decides which notes run, runs their step graphs
//! against the tool registry, and turns failures into retries, unit-test
//! notes or terminal failures.
//!
//! ## Architecture
//! ```text
//! re-rank loop (interval) ──score──▶ Scheduler (runnable set)
//! tick loop (interval) ──next()──▶ StepRunner (per note, ≤1 in flight)
//!   ├── StepGraph: dependency counts → FIFO ready-queue
//!   ├── ToolRegistry: validate → invoke (bounded by step timeout)
//!   ├── WriteCoalescer: every mutation → batched flush → storage + EventBus
//!   ├── FailurePolicy: retry │ escalate to unit-test note │ fail
//!   └── MemoryEvictor: compact the execution log
//! ```

pub mod analytics;
pub mod coalescer;
pub mod engine;
pub mod evictor;
pub mod events;
pub mod failure;
pub mod graph;
pub mod hooks;
pub mod placeholders;
pub mod runner;
pub mod scheduler;

pub use analytics::{NoteUsage, UsageAnalytics};
pub use coalescer::{WriteCoalescer, WriteReceipt};
pub use engine::FabricEngine;
pub use evictor::MemoryEvictor;
pub use events::EventBus;
pub use failure::{FailureDecision, FailurePolicy};
pub use graph::StepGraph;
pub use hooks::{TestHook, ToolTestHook};
pub use runner::{RunnerParts, StepRunner};
pub use scheduler::Scheduler;

#[cfg(test)]
pub(crate) mod test_support;
