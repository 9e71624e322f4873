use deltrack_common::layout::ProjectLayout;
use deltrack_common::table::render_table;
use deltrack_common::types::{SnapshotRecord, UNKNOWN};
use tracing::{debug, info};

use super::retry::{RetryingFileWriter, WriteOutcome};
use super::write_replacing;
use crate::host::{DocumentModel, LevelRef, LiveItem};

/// Writes a full dump of every live item to the snapshot table, replacing
/// the previous dump.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotExporter {
    writer: RetryingFileWriter,
}

impl SnapshotExporter {
    pub fn new(writer: RetryingFileWriter) -> Self {
        Self { writer }
    }

    /// Export `document` to `layout.snapshot_path()`. Returns the number of
    /// rows written, or `GaveUp` if the file stayed locked.
    pub fn export(
        &self,
        document: &dyn DocumentModel,
        layout: &ProjectLayout,
    ) -> WriteOutcome<usize> {
        let project_name = document.project_name();
        let records = snapshot_records(&project_name, document.items());
        let path = layout.snapshot_path();

        debug!(project = %project_name, rows = records.len(), "exporting snapshot");
        let outcome =
            self.writer.run(&path, || write_replacing(&path, &render_table(&records)?));
        if outcome.is_written() {
            info!(project = %project_name, rows = records.len(), path = %path.display(), "snapshot exported");
        }
        outcome.map(|()| records.len())
    }
}

/// Map live items to snapshot rows, skipping type definitions.
pub fn snapshot_records(project_name: &str, items: Vec<LiveItem>) -> Vec<SnapshotRecord> {
    items
        .into_iter()
        .filter(|item| !item.is_type)
        .map(|item| SnapshotRecord {
            project_name: project_name.to_string(),
            element_id: item.id,
            element_type: item.category.unwrap_or_else(|| UNKNOWN.to_string()),
            element_name: item.name,
            level: match item.level {
                LevelRef::None => UNKNOWN.to_string(),
                LevelRef::Named(name) => name,
                LevelRef::Dangling => String::new(),
            },
        })
        .collect()
}
