// Join of the deletion log against the latest snapshot.
//
// Both tables are reduced to first-row-wins maps keyed by element id. The
// report lists, in order of first appearance in the log, every deleted id
// that the snapshot still knows about; ids the snapshot never captured are
// dropped and only counted.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use deltrack_common::layout::ProjectLayout;
use deltrack_common::table::{parse_table, render_table, ParsedTable, TableRow};
use deltrack_common::types::{DeletedItem, DeletionRecord, ElementId, SnapshotRecord};
use tracing::{debug, info, warn};

use crate::store::retry::{RetryingFileWriter, WriteOutcome};
use crate::store::write_replacing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Distinct ids in the deletion log.
    pub deleted_ids: usize,
    /// Ids written to the report.
    pub matched: usize,
    /// Ids with no snapshot row.
    pub unmatched: usize,
    /// Rows of either table that failed to decode.
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Log or snapshot does not exist yet; nothing was written.
    SourcesMissing,
    Completed(ReconcileSummary),
    /// Join ran but the report stayed locked through every retry.
    ReportGaveUp(ReconcileSummary),
}

impl ReconcileOutcome {
    /// Whether the join itself ran to the end.
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::SourcesMissing)
    }
}

/// Result of joining two decoded tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Joined {
    pub items: Vec<DeletedItem>,
    pub deleted_ids: usize,
    pub unmatched: usize,
}

/// Join deletion rows against snapshot rows.
pub fn join_tables(log_rows: &[DeletionRecord], snapshot_rows: &[SnapshotRecord]) -> Joined {
    let mut snapshot_by_id: HashMap<ElementId, &SnapshotRecord> = HashMap::new();
    for row in snapshot_rows {
        snapshot_by_id.entry(row.element_id).or_insert(row);
    }

    let mut seen = HashSet::new();
    let mut joined = Joined::default();
    for deletion in log_rows {
        if !seen.insert(deletion.element_id) {
            continue;
        }
        joined.deleted_ids += 1;
        match snapshot_by_id.get(&deletion.element_id) {
            Some(snapshot) => joined.items.push(DeletedItem::join(deletion, snapshot)),
            None => joined.unmatched += 1,
        }
    }
    joined
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    writer: RetryingFileWriter,
}

impl Reconciler {
    pub fn new(writer: RetryingFileWriter) -> Self {
        Self { writer }
    }

    /// Rebuild the report for `layout` from its log and snapshot tables.
    pub fn reconcile(&self, layout: &ProjectLayout) -> Result<ReconcileOutcome> {
        let log_path = layout.deletion_log_path();
        let snapshot_path = layout.snapshot_path();
        if !log_path.is_file() || !snapshot_path.is_file() {
            debug!(project = %layout.folder_name(), "reconcile skipped, source table missing");
            return Ok(ReconcileOutcome::SourcesMissing);
        }

        let log: ParsedTable<DeletionRecord> = self.read_table(&log_path)?;
        let snapshot: ParsedTable<SnapshotRecord> = self.read_table(&snapshot_path)?;
        let skipped_rows = log.rejected.len() + snapshot.rejected.len();

        let joined = join_tables(&log.rows, &snapshot.rows);
        let summary = ReconcileSummary {
            deleted_ids: joined.deleted_ids,
            matched: joined.items.len(),
            unmatched: joined.unmatched,
            skipped_rows,
        };

        let report_path = layout.report_path();
        let write = || write_replacing(&report_path, &render_table(&joined.items)?);
        match self.writer.run(&report_path, write) {
            WriteOutcome::Written(()) => {
                info!(
                    project = %layout.folder_name(),
                    matched = summary.matched,
                    unmatched = summary.unmatched,
                    skipped_rows = summary.skipped_rows,
                    "deleted-items report rebuilt"
                );
                Ok(ReconcileOutcome::Completed(summary))
            }
            WriteOutcome::GaveUp { .. } => Ok(ReconcileOutcome::ReportGaveUp(summary)),
        }
    }

    fn read_table<T: TableRow>(&self, path: &Path) -> Result<ParsedTable<T>> {
        let contents = match self.writer.run(path, || fs::read(path)) {
            WriteOutcome::Written(contents) => contents,
            WriteOutcome::GaveUp { last_error, .. } => {
                return Err(last_error)
                    .with_context(|| format!("failed to read table `{}`", path.display()));
            }
        };

        let table = parse_table::<T>(&contents);
        for error in &table.rejected {
            warn!(path = %path.display(), line = error.line(), error = %error, "skipping malformed row");
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::{join_tables, ReconcileOutcome, Reconciler};
    use crate::store::deletion_log::DeletionLog;
    use crate::store::retry::{RetryPolicy, RetryingFileWriter};
    use crate::store::write_replacing;
    use deltrack_common::layout::ProjectLayout;
    use deltrack_common::table::{parse_table, render_table, ParsedTable, REPORT_HEADER};
    use deltrack_common::types::{DeletedItem, DeletionRecord, SnapshotRecord};
    use std::time::Duration;
    use tempfile::tempdir;

    fn deletion(id: i64, time: &str, user: &str) -> DeletionRecord {
        DeletionRecord {
            project_name: "Tower".into(),
            timestamp: time.into(),
            element_id: id,
            user_name: user.into(),
        }
    }

    fn snap(id: i64, kind: &str, name: &str) -> SnapshotRecord {
        SnapshotRecord {
            project_name: "Tower".into(),
            element_id: id,
            element_type: kind.into(),
            element_name: name.into(),
            level: "L1".into(),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(RetryingFileWriter::new(RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        }))
    }

    fn report(layout: &ProjectLayout) -> Vec<DeletedItem> {
        let contents = std::fs::read_to_string(layout.report_path()).unwrap();
        let parsed: ParsedTable<DeletedItem> = parse_table(&contents);
        assert!(parsed.rejected.is_empty());
        parsed.rows
    }

    #[test]
    fn join_keeps_only_ids_present_in_both_tables() {
        let log = vec![deletion(1, "t1", "a"), deletion(2, "t2", "b"), deletion(3, "t3", "c")];
        let snapshot = vec![snap(2, "Walls", "W2"), snap(3, "Doors", "D3"), snap(4, "Walls", "W4")];

        let joined = join_tables(&log, &snapshot);

        let ids: Vec<_> = joined.items.iter().map(|i| i.element_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(joined.items[0].element_type, "Walls");
        assert_eq!(joined.items[0].timestamp, "t2");
        assert_eq!(joined.items[1].element_name, "D3");
        assert_eq!(joined.items[1].user_name, "c");
        assert_eq!(joined.deleted_ids, 3);
        assert_eq!(joined.unmatched, 1);
    }

    #[test]
    fn join_uses_first_row_per_id_in_each_table() {
        let log = vec![deletion(5, "first", "bob"), deletion(5, "second", "ann")];
        let snapshot = vec![snap(5, "Walls", "old"), snap(5, "Walls", "new")];

        let joined = join_tables(&log, &snapshot);

        assert_eq!(joined.items.len(), 1);
        assert_eq!(joined.items[0].timestamp, "first");
        assert_eq!(joined.items[0].user_name, "bob");
        assert_eq!(joined.items[0].element_name, "old");
        assert_eq!(joined.deleted_ids, 1);
    }

    #[test]
    fn missing_sources_are_a_no_op() {
        let tmp = tempdir().expect("tempdir should be created");
        let layout = ProjectLayout::new(tmp.path(), "Tower", "AR");

        assert_eq!(reconciler().reconcile(&layout).unwrap(), ReconcileOutcome::SourcesMissing);

        DeletionLog::new(layout.deletion_log_path()).append(&[deletion(1, "t", "u")]).unwrap();
        assert_eq!(reconciler().reconcile(&layout).unwrap(), ReconcileOutcome::SourcesMissing);
        assert!(!layout.report_path().exists());
    }

    #[test]
    fn reconcile_writes_report_and_is_byte_stable() {
        let tmp = tempdir().expect("tempdir should be created");
        let layout = ProjectLayout::new(tmp.path(), "Tower", "AR");
        DeletionLog::new(layout.deletion_log_path())
            .append(&[deletion(2, "t2", "bob"), deletion(9, "t9", "bob")])
            .unwrap();
        let snapshot = render_table(&[snap(2, "Walls", "W2")]).unwrap();
        write_replacing(&layout.snapshot_path(), &snapshot).unwrap();

        let outcome = reconciler().reconcile(&layout).unwrap();
        let first = std::fs::read(layout.report_path()).unwrap();
        reconciler().reconcile(&layout).unwrap();
        let second = std::fs::read(layout.report_path()).unwrap();

        match outcome {
            ReconcileOutcome::Completed(summary) => {
                assert_eq!(summary.matched, 1);
                assert_eq!(summary.unmatched, 1);
                assert_eq!(summary.skipped_rows, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(first, second);
        assert!(String::from_utf8(first).unwrap().starts_with(REPORT_HEADER));
        assert_eq!(report(&layout)[0].element_id, 2);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let tmp = tempdir().expect("tempdir should be created");
        let layout = ProjectLayout::new(tmp.path(), "Tower", "AR");
        write_replacing(
            &layout.deletion_log_path(),
            "Project Name,Element ID,Time,User\nTower,x12,t,u\nTower,7,t7,bob\n",
        )
        .unwrap();
        write_replacing(
            &layout.snapshot_path(),
            "Project Name,Element ID,Element Type,Element Name,Level\nTower,7,Walls,W7,L2\nbroken\n",
        )
        .unwrap();

        let outcome = reconciler().reconcile(&layout).unwrap();

        match outcome {
            ReconcileOutcome::Completed(summary) => assert_eq!(summary.skipped_rows, 2),
            other => panic!("unexpected outcome {other:?}"),
        }
        let rows = report(&layout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, "L2");
        assert_eq!(rows[0].timestamp, "t7");
    }

    #[test]
    fn undecodable_bytes_skip_the_row_not_the_pass() {
        let tmp = tempdir().expect("tempdir should be created");
        let layout = ProjectLayout::new(tmp.path(), "Tower", "AR");
        let mut log = b"Project Name,Element ID,Time,User\nTower,7,t7,bob\nTower,8,t8,".to_vec();
        log.extend_from_slice(b"\xe8\xe2\n");
        std::fs::create_dir_all(layout.source_tables_dir()).unwrap();
        std::fs::write(layout.deletion_log_path(), log).unwrap();
        let snapshot = render_table(&[snap(7, "Walls", "W7"), snap(8, "Walls", "W8")]).unwrap();
        write_replacing(&layout.snapshot_path(), &snapshot).unwrap();

        let outcome = reconciler().reconcile(&layout).unwrap();

        match outcome {
            ReconcileOutcome::Completed(summary) => {
                assert_eq!(summary.matched, 1);
                assert_eq!(summary.skipped_rows, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let rows = report(&layout);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].element_id, 7);
    }

    #[test]
    fn report_is_rewritten_not_appended() {
        let tmp = tempdir().expect("tempdir should be created");
        let layout = ProjectLayout::new(tmp.path(), "Tower", "AR");
        let log = DeletionLog::new(layout.deletion_log_path());
        log.append(&[deletion(1, "t1", "bob")]).unwrap();
        write_replacing(
            &layout.snapshot_path(),
            &render_table(&[snap(1, "Walls", "W1"), snap(2, "Walls", "W2")]).unwrap(),
        )
        .unwrap();
        reconciler().reconcile(&layout).unwrap();

        log.append(&[deletion(2, "t2", "bob")]).unwrap();
        reconciler().reconcile(&layout).unwrap();

        let ids: Vec<_> = report(&layout).iter().map(|i| i.element_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
