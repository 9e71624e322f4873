// Shared accumulator of deletion records between host callbacks and the
// flush cycle.
//
// A single mutex guards both the pending records and the dirty flag, so
// `record` and `drain_all` observe one total order. The lock is only held
// for the push or the swap; no I/O happens under it.

use std::sync::{Mutex, MutexGuard};

use deltrack_common::types::DeletionRecord;

#[derive(Debug, Default)]
struct BufferState {
    records: Vec<DeletionRecord>,
    /// Set on every record, cleared by `settle_after_reconcile`.
    dirty: bool,
}

#[derive(Debug, Default)]
pub struct DeletionBuffer {
    state: Mutex<BufferState>,
}

impl DeletionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // A panicking producer cannot leave the vector half-pushed, so the
        // data behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, entry: DeletionRecord) {
        let mut state = self.lock();
        state.records.push(entry);
        state.dirty = true;
    }

    /// Append a whole notification's worth of records under one lock, so
    /// they stay contiguous in drain order.
    pub fn record_batch(&self, entries: impl IntoIterator<Item = DeletionRecord>) -> usize {
        let mut state = self.lock();
        let before = state.records.len();
        state.records.extend(entries);
        let added = state.records.len() - before;
        if added > 0 {
            state.dirty = true;
        }
        added
    }

    /// Take every pending record, leaving the buffer empty. The dirty flag
    /// is left alone until the reconciliation that follows settles it.
    pub fn drain_all(&self) -> Vec<DeletionRecord> {
        std::mem::take(&mut self.lock().records)
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Clear the dirty flag after a reconciliation attempt, unless records
    /// arrived after the last drain. Returns the new flag value.
    pub fn settle_after_reconcile(&self) -> bool {
        let mut state = self.lock();
        state.dirty = !state.records.is_empty();
        state.dirty
    }
}
