//! Graph store: notes plus adjacency-list reference edges.
//! Pure in-memory index; persistence is the coalescer's job.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use notefabric_core::error::{FabricError, Result};
use notefabric_core::traits::NoteReader;
use notefabric_core::types::{Edge, Note};

/// Relationship used for edges derived from `note.references`.
pub const DEFAULT_RELATIONSHIP: &str = "references";

#[derive(Default)]
struct GraphInner {
    notes: HashMap<String, Note>,
    /// Keyed by source id.
    edges: HashMap<String, Vec<Edge>>,
}

impl GraphInner {
    /// Rebuild a source's edge list from its `references`, keeping known relationships.
    fn sync_edges(&mut self, source_id: &str) {
        let Some(note) = self.notes.get_mut(source_id) else {
            self.edges.remove(source_id);
            return;
        };
        let mut seen = Vec::with_capacity(note.references.len());
        note.references.retain(|t| {
            if seen.contains(t) {
                false
            } else {
                seen.push(t.clone());
                true
            }
        });

        let old = self.edges.remove(source_id).unwrap_or_default();
        let edges: Vec<Edge> = note
            .references
            .iter()
            .map(|target| {
                old.iter()
                    .find(|e| &e.target_id == target)
                    .cloned()
                    .unwrap_or_else(|| Edge::new(source_id, target, DEFAULT_RELATIONSHIP))
            })
            .collect();
        if !edges.is_empty() {
            self.edges.insert(source_id.to_string(), edges);
        }
    }
}

/// The note graph. All mutation goes through these methods.
#[derive(Default)]
pub struct GraphStore {
    inner: RwLock<GraphInner>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a loaded note set.
    pub fn from_notes(notes: Vec<Note>) -> Self {
        let store = Self::new();
        for note in notes {
            store.add_note(note);
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a note; its edges are rebuilt from `references`.
    pub fn add_note(&self, note: Note) {
        let mut inner = self.write();
        let id = note.id.clone();
        inner.notes.insert(id.clone(), note);
        inner.sync_edges(&id);
    }

    /// Replace an existing note. Returns false (and stores nothing) if the
    /// note was removed in the meantime.
    pub fn put_note(&self, note: Note) -> bool {
        let mut inner = self.write();
        if !inner.notes.contains_key(&note.id) {
            return false;
        }
        let id = note.id.clone();
        inner.notes.insert(id.clone(), note);
        inner.sync_edges(&id);
        true
    }

    /// Mutate a note in place under the write lock.
    pub fn update_note<F>(&self, id: &str, f: F) -> Option<Note>
    where
        F: FnOnce(&mut Note),
    {
        let mut inner = self.write();
        let note = inner.notes.get_mut(id)?;
        f(note);
        note.touch();
        inner.sync_edges(id);
        inner.notes.get(id).cloned()
    }

    /// Apply a fallible edit to a copy of the live note and store it only if
    /// the edit succeeds, all under one write lock. References to unknown
    /// notes (or to the note itself) are dropped.
    pub fn try_update_note<F>(&self, id: &str, f: F) -> Result<Note>
    where
        F: FnOnce(&mut Note) -> Result<()>,
    {
        let mut inner = self.write();
        let mut draft = inner
            .notes
            .get(id)
            .cloned()
            .ok_or_else(|| FabricError::NoteNotFound(id.to_string()))?;
        f(&mut draft)?;
        draft.id = id.to_string();
        draft
            .references
            .retain(|target| target != id && inner.notes.contains_key(target));
        draft.touch();
        inner.notes.insert(id.to_string(), draft);
        inner.sync_edges(id);
        inner
            .notes
            .get(id)
            .cloned()
            .ok_or_else(|| FabricError::NoteNotFound(id.to_string()))
    }

    /// Remove a note and every edge touching it.
    /// Returns the ids of the sources whose `references` were pruned.
    /// Removing an unknown id is a no-op.
    pub fn remove_note(&self, id: &str) -> Vec<String> {
        let mut inner = self.write();
        inner.notes.remove(id);
        inner.edges.remove(id);

        let mut pruned = Vec::new();
        let GraphInner { notes, edges } = &mut *inner;
        edges.retain(|source_id, list| {
            let before = list.len();
            list.retain(|e| e.target_id != id);
            if list.len() != before {
                pruned.push(source_id.clone());
                if let Some(source) = notes.get_mut(source_id) {
                    source.references.retain(|t| t != id);
                    source.touch();
                }
            }
            !list.is_empty()
        });
        pruned.sort();
        pruned
    }

    pub fn get_note(&self, id: &str) -> Option<Note> {
        self.read().notes.get(id).cloned()
    }

    /// All notes, in no particular order.
    pub fn get_notes(&self) -> Vec<Note> {
        self.read().notes.values().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().notes.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.read().notes.len()
    }

    /// Add (or relabel) a typed edge; both endpoints must exist.
    pub fn add_edge(&self, source_id: &str, target_id: &str, relationship: &str) -> Result<()> {
        let mut inner = self.write();
        if !inner.notes.contains_key(target_id) {
            return Err(FabricError::NoteNotFound(target_id.to_string()));
        }
        let Some(source) = inner.notes.get_mut(source_id) else {
            return Err(FabricError::NoteNotFound(source_id.to_string()));
        };
        if !source.references.iter().any(|t| t == target_id) {
            source.references.push(target_id.to_string());
            source.touch();
        }

        let list = inner.edges.entry(source_id.to_string()).or_default();
        match list.iter_mut().find(|e| e.target_id == target_id) {
            Some(edge) => edge.relationship = relationship.to_string(),
            None => list.push(Edge::new(source_id, target_id, relationship)),
        }
        Ok(())
    }

    /// Remove an edge. Returns true if one existed.
    pub fn remove_edge(&self, source_id: &str, target_id: &str) -> bool {
        let mut inner = self.write();
        let Some(list) = inner.edges.get_mut(source_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.target_id != target_id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.edges.remove(source_id);
        }
        if removed && let Some(source) = inner.notes.get_mut(source_id) {
            source.references.retain(|t| t != target_id);
            source.touch();
        }
        removed
    }

    /// Outgoing edges of a note.
    pub fn get_references(&self, id: &str) -> Vec<Edge> {
        self.read().edges.get(id).cloned().unwrap_or_default()
    }
}

impl NoteReader for GraphStore {
    fn get_note(&self, id: &str) -> Option<Note> {
        GraphStore::get_note(self, id)
    }

    fn get_notes(&self) -> Vec<Note> {
        GraphStore::get_notes(self)
    }

    fn get_references(&self, id: &str) -> Vec<Edge> {
        GraphStore::get_references(self, id)
    }
}
