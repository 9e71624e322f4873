// State shared by every component of a running tracker.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use deltrack_common::layout::ProjectLayout;

use crate::buffer::DeletionBuffer;
use crate::flush::FlushState;
use crate::host::DocumentModel;
use crate::store::retry::RetryingFileWriter;

pub struct TrackerContext {
    buffer: DeletionBuffer,
    shared_root: PathBuf,
    operator_prefix: String,
    active_document: RwLock<Option<Arc<dyn DocumentModel>>>,
    writer: RetryingFileWriter,
    /// Held for the whole drain → append → reconcile sequence.
    flush_state: Mutex<FlushState>,
}

impl std::fmt::Debug for TrackerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerContext")
            .field("shared_root", &self.shared_root)
            .field("operator_prefix", &self.operator_prefix)
            .field("pending", &self.buffer.len())
            .field("dirty", &self.buffer.is_dirty())
            .finish_non_exhaustive()
    }
}

impl TrackerContext {
    pub fn new(
        shared_root: impl Into<PathBuf>,
        operator_prefix: impl Into<String>,
        writer: RetryingFileWriter,
    ) -> Self {
        Self {
            buffer: DeletionBuffer::new(),
            shared_root: shared_root.into(),
            operator_prefix: operator_prefix.into(),
            active_document: RwLock::new(None),
            writer,
            flush_state: Mutex::new(FlushState::default()),
        }
    }

    pub fn buffer(&self) -> &DeletionBuffer {
        &self.buffer
    }

    pub fn writer(&self) -> RetryingFileWriter {
        self.writer
    }

    pub fn shared_root(&self) -> &Path {
        &self.shared_root
    }

    pub fn operator_prefix(&self) -> &str {
        &self.operator_prefix
    }

    pub fn layout_for(&self, project_name: &str) -> ProjectLayout {
        ProjectLayout::new(&self.shared_root, project_name, &self.operator_prefix)
    }

    pub fn set_active_document(&self, document: Arc<dyn DocumentModel>) {
        let mut active = self.active_document.write().unwrap_or_else(|p| p.into_inner());
        *active = Some(document);
    }

    pub fn active_document(&self) -> Option<Arc<dyn DocumentModel>> {
        self.active_document.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Layout of the active document's project, if a document is active.
    pub fn active_layout(&self) -> Option<ProjectLayout> {
        self.active_document().map(|doc| self.layout_for(&doc.project_name()))
    }

    pub(crate) fn lock_flush(&self) -> MutexGuard<'_, FlushState> {
        self.flush_state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TrackerContext;
    use crate::host::StaticDocument;
    use crate::store::retry::RetryingFileWriter;

    #[test]
    fn active_layout_follows_latest_document() {
        let ctx = TrackerContext::new("/share", "AR", RetryingFileWriter::default());
        assert!(ctx.active_layout().is_none());

        ctx.set_active_document(Arc::new(StaticDocument {
            path: "/m/Tower.rvt".into(),
            ..Default::default()
        }));
        assert_eq!(ctx.active_layout().unwrap().folder_name(), "Tower_AR");

        ctx.set_active_document(Arc::new(StaticDocument {
            path: "/m/Annex.rvt".into(),
            ..Default::default()
        }));
        assert_eq!(ctx.active_layout().unwrap().folder_name(), "Annex_AR");
    }
}
