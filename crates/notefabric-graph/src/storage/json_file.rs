//! File-based note store: one JSON file per note.
//! Human-readable, git-friendly; only touched on flush.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::NoteStorage;
use notefabric_core::types::Note;

pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Create a store rooted at `dir`, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Distinct ids always map to distinct files: bytes outside
    /// `[A-Za-z0-9_-]` are percent-encoded.
    fn file_for(&self, id: &str) -> PathBuf {
        let mut safe = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                safe.push(byte as char);
            } else {
                safe.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{safe}.json"))
    }

    async fn write_note(&self, note: &Note) -> Result<()> {
        let file = self.file_for(&note.id);
        let tmp = file.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(note)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &file).await?;
        Ok(())
    }
}

#[async_trait]
impl NoteStorage for JsonFileStorage {
    fn name(&self) -> &str {
        "json"
    }

    async fn load(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to read {}: {e}", path.display());
                    continue;
                }
            };
            match serde_json::from_str::<Note>(&raw) {
                Ok(note) => notes.push(note),
                Err(e) => tracing::warn!("⚠️ Skipping unparseable note {}: {e}", path.display()),
            }
        }
        tracing::debug!("📂 Loaded {} notes from {}", notes.len(), self.dir.display());
        Ok(notes)
    }

    async fn save(&self, note: &Note) -> Result<()> {
        self.write_note(note)
            .await
            .map_err(|e| FabricError::Storage(format!("save '{}': {e}", note.id)))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.file_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FabricError::Storage(format!("delete '{id}': {e}"))),
        }
    }

    async fn remove_references_to(&self, id: &str) -> Result<()> {
        for mut note in self.load().await? {
            if note.references.iter().any(|r| r == id) {
                note.references.retain(|r| r != id);
                self.write_note(&note).await?;
            }
        }
        Ok(())
    }
}
