//! SQLite-backed note storage: survives restarts, one row per note.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::NoteStorage;
use notefabric_core::types::Note;

pub struct SqliteStorage {
    conn: Mutex<rusqlite::Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> FabricError + '_ {
    move |e| FabricError::Storage(format!("{context}: {e}"))
}

impl SqliteStorage {
    /// Open or create the notes database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 50,
                body TEXT NOT NULL,             -- full note as JSON
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notes_status ON notes(status);
         ",
            )
            .map_err(db_err("Migration"))
    }

    fn upsert(conn: &rusqlite::Connection, note: &Note) -> Result<()> {
        let body = serde_json::to_string(note)?;
        conn.execute(
            "INSERT OR REPLACE INTO notes (id, title, status, priority, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                note.id,
                note.title,
                note.status.to_string(),
                note.priority,
                body,
                note.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("Save note"))?;
        Ok(())
    }

    fn load_all(conn: &rusqlite::Connection) -> Result<Vec<Note>> {
        let mut stmt = conn
            .prepare("SELECT id, body FROM notes ORDER BY updated_at")
            .map_err(db_err("Load notes"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err("Load notes"))?;

        let mut notes = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(db_err("Load notes"))?;
            match serde_json::from_str::<Note>(&body) {
                Ok(note) => notes.push(note),
                Err(e) => tracing::warn!("⚠️ Skipping unparseable note row '{id}': {e}"),
            }
        }
        Ok(notes)
    }
}

#[async_trait]
impl NoteStorage for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self) -> Result<Vec<Note>> {
        Self::load_all(&self.conn())
    }

    async fn save(&self, note: &Note) -> Result<()> {
        Self::upsert(&self.conn(), note)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM notes WHERE id = ?1", rusqlite::params![id])
            .map_err(db_err("Delete note"))?;
        Ok(())
    }

    async fn remove_references_to(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        for mut note in Self::load_all(&conn)? {
            if note.references.iter().any(|r| r == id) {
                note.references.retain(|r| r != id);
                Self::upsert(&conn, &note)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefabric_core::types::NoteStatus;

    #[tokio::test]
    async fn test_roundtrip_and_replace() {
        let db = SqliteStorage::open_in_memory().unwrap();
        let mut note = Note::new("sqlite");
        db.save(&note).await.unwrap();
        note.status = NoteStatus::Completed;
        db.save(&note).await.unwrap();

        let notes = db.load().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].status, NoteStatus::Completed);

        db.delete(&note.id).await.unwrap();
        assert!(db.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_references_to() {
        let db = SqliteStorage::open_in_memory().unwrap();
        let mut source = Note::new("source");
        source.references = vec!["gone".into(), "kept".into()];
        db.save(&source).await.unwrap();
        db.remove_references_to("gone").await.unwrap();
        assert_eq!(db.load().await.unwrap()[0].references, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = std::env::temp_dir().join(format!("notefabric-sqlite-{}", uuid::Uuid::new_v4()));
        let path = dir.join("notes.db");
        {
            let db = SqliteStorage::open(&path).unwrap();
            db.save(&Note::new("on disk")).await.unwrap();
        }
        let db = SqliteStorage::open(&path).unwrap();
        assert_eq!(db.load().await.unwrap()[0].title, "on disk");
        std::fs::remove_dir_all(&dir).ok();
    }
}
