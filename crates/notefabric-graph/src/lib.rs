//! # NoteFabric Graph
//!
//! The in-memory note index ([`GraphStore`]) and the storage collaborators
//! that persist notes between restarts.
//!
//! ```text
//! GraphStore (owned by the engine, RwLock-guarded)
//!   ├── notes: id → Note
//!   └── edges: source id → [Edge]   (note.references mirrors the targets)
//!
//! NoteStorage
//!   ├── MemoryStorage   tests, ephemeral runs
//!   ├── JsonFileStorage one JSON file per note
//!   └── SqliteStorage   single notes table
//! ```

pub mod storage;
pub mod store;

pub use storage::{JsonFileStorage, MemoryStorage, SqliteStorage, create_storage};
pub use store::GraphStore;
