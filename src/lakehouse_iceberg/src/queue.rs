//! File Queue (spec.md §4.5): an in-memory FIFO of pending file ids plus a
//! processing set, guarded by a single lock so pending/processing never
//! overlap and pending never contains duplicates (spec.md §3 invariant,
//! testable property P5).

use crate::error::{Error, Result};
use lakehouse_registry::TableFile;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueStats {
    pub pending_count: usize,
    pub processing_count: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
}

struct State {
    pending: VecDeque<TableFile>,
    pending_ids: HashSet<i64>,
    processing: HashSet<i64>,
    stats: QueueStats,
}

/// Mutually-exclusive FIFO + processing set (spec.md §4.5). All operations
/// take the single internal lock, so pending/processing membership is
/// always consistent to any observer.
pub struct FileQueue {
    state: Mutex<State>,
}

impl Default for FileQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FileQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                pending_ids: HashSet::new(),
                processing: HashSet::new(),
                stats: QueueStats::default(),
            }),
        }
    }

    /// `Enqueue(file)`: fails with `AlreadyQueued` if the file id is already
    /// pending or processing.
    pub async fn enqueue(&self, file: TableFile) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.pending_ids.contains(&file.id) || state.processing.contains(&file.id) {
            return Err(Error::AlreadyQueued(file.id));
        }
        state.pending_ids.insert(file.id);
        state.pending.push_back(file);
        state.stats.total_enqueued += 1;
        Ok(())
    }

    /// Promotes an already-enqueued `id` from pending straight into
    /// processing, without disturbing FIFO order for other pending ids.
    /// Used by callers (the Iceberg Manager) that enqueue a file and start
    /// processing it immediately rather than waiting for a separate
    /// `Dequeue`/`GetBatch` pull. Idempotent if `id` is already processing;
    /// fails with `NotProcessing` if `id` is in neither set.
    pub async fn begin_processing(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.processing.contains(&id) {
            return Ok(());
        }
        if !state.pending_ids.remove(&id) {
            return Err(Error::NotProcessing(id));
        }
        if let Some(pos) = state.pending.iter().position(|f| f.id == id) {
            state.pending.remove(pos);
        }
        state.processing.insert(id);
        state.stats.total_dequeued += 1;
        Ok(())
    }

    /// `Dequeue()`: pops the head of pending into processing; `None` if empty.
    pub async fn dequeue(&self) -> Option<TableFile> {
        let mut state = self.state.lock().await;
        let file = state.pending.pop_front()?;
        state.pending_ids.remove(&file.id);
        state.processing.insert(file.id);
        state.stats.total_dequeued += 1;
        Some(file)
    }

    /// `GetBatch(maxFiles)`: pops up to `max_files` from the head, atomically
    /// moving all of them to processing.
    pub async fn get_batch(&self, max_files: usize) -> Vec<TableFile> {
        let mut state = self.state.lock().await;
        let n = max_files.min(state.pending.len());
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            let file = state.pending.pop_front().expect("checked length above");
            state.pending_ids.remove(&file.id);
            state.processing.insert(file.id);
            batch.push(file);
        }
        state.stats.total_dequeued += n as u64;
        batch
    }

    /// `MarkCompleted(id)`: fails with `NotProcessing` if `id` is not in the
    /// processing set.
    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.processing.remove(&id) {
            return Err(Error::NotProcessing(id));
        }
        state.stats.total_completed += 1;
        Ok(())
    }

    /// `MarkFailed(id)`: fails with `NotProcessing` if `id` is not in the
    /// processing set.
    pub async fn mark_failed(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.processing.remove(&id) {
            return Err(Error::NotProcessing(id));
        }
        state.stats.total_failed += 1;
        Ok(())
    }

    pub async fn get_pending(&self) -> Vec<TableFile> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    pub async fn get_processing(&self) -> Vec<i64> {
        self.state.lock().await.processing.iter().copied().collect()
    }

    pub async fn is_queued(&self, id: i64) -> bool {
        let state = self.state.lock().await;
        state.pending_ids.contains(&id) || state.processing.contains(&id)
    }

    pub async fn get_stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            pending_count: state.pending.len(),
            processing_count: state.processing.len(),
            ..state.stats
        }
    }
}
