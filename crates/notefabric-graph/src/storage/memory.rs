use std::collections::HashMap;

use async_trait::async_trait;
use notefabric_core::error::Result;
use notefabric_core::traits::NoteStorage;
use notefabric_core::types::Note;
use tokio::sync::Mutex;

/// Volatile storage, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    notes: Mutex<HashMap<String, Note>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            notes: Mutex::new(notes.into_iter().map(|n| (n.id.clone(), n)).collect()),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Note> {
        self.notes.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.notes.lock().await.len()
    }
}

#[async_trait]
impl NoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<Note>> {
        Ok(self.notes.lock().await.values().cloned().collect())
    }

    async fn save(&self, note: &Note) -> Result<()> {
        self.notes.lock().await.insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.notes.lock().await.remove(id);
        Ok(())
    }

    async fn remove_references_to(&self, id: &str) -> Result<()> {
        for note in self.notes.lock().await.values_mut() {
            note.references.retain(|r| r != id);
        }
        Ok(())
    }
}
