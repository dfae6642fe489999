//! Debounced write coalescing with broadcast.
//!
//! The first write request after a flush arms a single timer; every request
//! until it fires joins the same batch. A flush persists the current graph
//! copy of each pending note, broadcasts it, and resolves every waiter that
//! asked for it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use notefabric_core::protocol::OutboundMessage;
use notefabric_core::traits::NoteStorage;
use notefabric_graph::GraphStore;
use tokio::sync::oneshot;

use crate::events::EventBus;

/// Resolves once a flush containing the requested note has completed.
/// Dropping it does not cancel the write.
#[must_use = "await the receipt to wait for the flush, or drop it to fire and forget"]
pub struct WriteReceipt {
    rx: oneshot::Receiver<()>,
}

impl Future for WriteReceipt {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[derive(Default)]
struct PendingWrites {
    waiters: HashMap<String, Vec<oneshot::Sender<()>>>,
    /// Generation of the armed timer, if any. Bumped by every flush.
    armed: Option<u64>,
    generation: u64,
}

struct Inner {
    graph: Arc<GraphStore>,
    storage: Arc<dyn NoteStorage>,
    events: EventBus,
    interval: Duration,
    pending: Mutex<PendingWrites>,
}

#[derive(Clone)]
pub struct WriteCoalescer {
    inner: Arc<Inner>,
}

impl WriteCoalescer {
    pub fn new(
        graph: Arc<GraphStore>,
        storage: Arc<dyn NoteStorage>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                graph,
                storage,
                events,
                interval,
                pending: Mutex::new(PendingWrites::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingWrites> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `note_id` for the next flush.
    pub fn request_write(&self, note_id: &str) -> WriteReceipt {
        let (tx, rx) = oneshot::channel();
        let arm = {
            let mut pending = self.lock();
            pending.waiters.entry(note_id.to_string()).or_default().push(tx);
            if pending.armed.is_none() {
                let generation = pending.generation;
                pending.armed = Some(generation);
                Some(generation)
            } else {
                None
            }
        };

        if let Some(generation) = arm {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(this.inner.interval).await;
                this.flush_generation(Some(generation)).await;
            });
        }
        WriteReceipt { rx }
    }

    /// Ids waiting for the next flush.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().waiters.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Flush immediately, regardless of the timer. Returns the number of
    /// notes flushed.
    pub async fn flush_now(&self) -> usize {
        self.flush_generation(None).await
    }

    async fn flush_generation(&self, timer: Option<u64>) -> usize {
        let batch = {
            let mut pending = self.lock();
            // A timer that outlived an explicit flush has nothing left to do.
            if timer.is_some() && pending.armed != timer {
                return 0;
            }
            pending.armed = None;
            pending.generation += 1;
            std::mem::take(&mut pending.waiters)
        };
        if batch.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        for (id, waiters) in batch {
            match self.inner.graph.get_note(&id) {
                Some(note) => {
                    self.inner
                        .events
                        .publish(OutboundMessage::NoteUpdate { data: note.clone() });
                    if let Err(e) = self.inner.storage.save(&note).await {
                        tracing::warn!("⚠️ Failed to persist note '{id}': {e}");
                    }
                    flushed += 1;
                }
                None => tracing::debug!("🗑️ Skipping flush of removed note '{id}'"),
            }
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
        tracing::debug!("💾 Flushed {flushed} note(s)");
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notefabric_core::error::{FabricError, Result};
    use notefabric_core::types::Note;
    use notefabric_graph::MemoryStorage;
    use std::time::Instant;

    fn setup(interval_ms: u64) -> (Arc<GraphStore>, Arc<MemoryStorage>, EventBus, WriteCoalescer) {
        let graph = Arc::new(GraphStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let events = EventBus::default();
        let coalescer = WriteCoalescer::new(
            graph.clone(),
            storage.clone(),
            events.clone(),
            Duration::from_millis(interval_ms),
        );
        (graph, storage, events, coalescer)
    }

    #[tokio::test]
    async fn test_two_waiters_same_flush() {
        let (graph, storage, events, coalescer) = setup(30);
        let mut rx = events.subscribe();
        let note = Note::new("twice");
        graph.add_note(note.clone());

        let started = Instant::now();
        let first = coalescer.request_write(&note.id);
        let second = coalescer.request_write(&note.id);
        assert_eq!(coalescer.pending_ids(), vec![note.id.clone()]);
        tokio::time::timeout(Duration::from_secs(2), async {
            first.await;
            second.await;
        })
        .await
        .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));

        assert!(storage.get(&note.id).await.is_some());
        // One broadcast for the single flush.
        assert!(matches!(rx.recv().await.unwrap(), OutboundMessage::NoteUpdate { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flush_now_and_stale_timer() {
        let (graph, storage, _events, coalescer) = setup(50);
        let note = Note::new("now");
        graph.add_note(note.clone());
        let receipt = coalescer.request_write(&note.id);
        assert_eq!(coalescer.flush_now().await, 1);
        receipt.await;
        assert_eq!(storage.len().await, 1);
        // The old timer fires into an empty batch.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(coalescer.pending_ids().is_empty());
    }

    struct BrokenStorage;

    #[async_trait]
    impl NoteStorage for BrokenStorage {
        fn name(&self) -> &str {
            "broken"
        }
        async fn load(&self) -> Result<Vec<Note>> {
            Ok(vec![])
        }
        async fn save(&self, note: &Note) -> Result<()> {
            if note.title == "bad" {
                Err(FabricError::Storage("disk full".into()))
            } else {
                Ok(())
            }
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_references_to(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_batch() {
        let graph = Arc::new(GraphStore::new());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let coalescer =
            WriteCoalescer::new(graph.clone(), Arc::new(BrokenStorage), events, Duration::from_millis(10));
        let bad = Note::new("bad");
        let good = Note::new("good");
        graph.add_note(bad.clone());
        graph.add_note(good.clone());

        let a = coalescer.request_write(&bad.id);
        let b = coalescer.request_write(&good.id);
        tokio::time::timeout(Duration::from_secs(2), async {
            a.await;
            b.await;
        })
        .await
        .unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_removed_note_still_resolves_waiter() {
        let (_graph, storage, _events, coalescer) = setup(10);
        let receipt = coalescer.request_write("ghost");
        tokio::time::timeout(Duration::from_secs(2), receipt).await.unwrap();
        assert_eq!(storage.len().await, 0);
    }
}
