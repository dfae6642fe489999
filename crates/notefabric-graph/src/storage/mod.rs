//! Storage collaborators: where notes live between restarts.

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::sync::Arc;

use notefabric_core::config::PersistenceConfig;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::NoteStorage;

/// Create a storage backend from configuration.
pub fn create_storage(config: &PersistenceConfig) -> Result<Arc<dyn NoteStorage>> {
    let path = config.resolved_path();
    match config.backend.as_str() {
        "json" => Ok(Arc::new(JsonFileStorage::new(&path)?)),
        "sqlite" => {
            let file = if path.extension().is_some() {
                path
            } else {
                path.join("notes.db")
            };
            Ok(Arc::new(SqliteStorage::open(&file)?))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => Err(FabricError::Config(format!(
            "Unknown persistence backend: {other}"
        ))),
    }
}
