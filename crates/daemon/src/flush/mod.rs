// Flush cycle: drain the buffer into the deletion log, then rebuild the
// deleted-items report.
//
// Runs on a timer tick, on opened/synchronized/saved notifications and at
// shutdown, always gated on the buffer's dirty flag. Cycles are serialized
// through the context's flush guard.

pub mod ticker;

use tracing::{debug, error, warn};

use deltrack_common::types::DeletionRecord;

use crate::context::TrackerContext;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::store::deletion_log::DeletionLog;
use crate::store::retry::WriteOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Tick,
    Opened,
    Synchronized,
    Saved,
    Shutdown,
}

impl FlushReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Opened => "opened",
            Self::Synchronized => "synchronized",
            Self::Saved => "saved",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Reconciliation result for one project touched by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReconcile {
    pub project: String,
    /// `None` when reconciliation failed to read its sources.
    pub outcome: Option<ReconcileOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushReport {
    /// Nothing recorded since the last reconciliation.
    Clean,
    /// Dirty with nothing pending and no active document to reconcile.
    NoDocument,
    Flushed {
        /// Records appended to deletion logs.
        appended: usize,
        /// Drained records dropped because a log stayed locked.
        lost: usize,
        reconciled: Vec<ProjectReconcile>,
        /// Dirty flag after the cycle.
        still_dirty: bool,
    },
}

/// Carried between cycles under the flush lock.
#[derive(Debug, Default)]
pub(crate) struct FlushState {
    /// Projects whose last reconcile could not run; retried on every cycle
    /// until it does.
    unreconciled: Vec<String>,
}

/// Split drained records by project, keeping drain order inside each
/// project and first-appearance order across projects.
fn group_by_project(drained: Vec<DeletionRecord>) -> Vec<(String, Vec<DeletionRecord>)> {
    let mut groups: Vec<(String, Vec<DeletionRecord>)> = Vec::new();
    for record in drained {
        match groups.iter_mut().find(|(project, _)| *project == record.project_name) {
            Some((_, records)) => records.push(record),
            None => groups.push((record.project_name.clone(), vec![record])),
        }
    }
    groups
}

/// Run one flush cycle if the buffer is dirty.
///
/// Each record goes to the log of the project it was deleted from. Projects
/// whose reconcile could not run on an earlier cycle are reconciled again.
/// When nothing else is pending, the active document's project is used.
pub fn flush_if_dirty(ctx: &TrackerContext, reason: FlushReason) -> FlushReport {
    let mut state = ctx.lock_flush();
    if !ctx.buffer().is_dirty() {
        return FlushReport::Clean;
    }

    let mut groups = group_by_project(ctx.buffer().drain_all());
    for project in std::mem::take(&mut state.unreconciled) {
        if !groups.iter().any(|(name, _)| *name == project) {
            groups.push((project, Vec::new()));
        }
    }
    if groups.is_empty() {
        match ctx.active_document() {
            Some(document) => groups.push((document.project_name(), Vec::new())),
            None => {
                debug!(reason = reason.as_str(), "flush deferred, no active document");
                return FlushReport::NoDocument;
            }
        }
    }

    let reconciler = Reconciler::new(ctx.writer());
    let mut appended = 0;
    let mut lost = 0;
    let mut reconciled = Vec::with_capacity(groups.len());
    for (project, records) in groups {
        let layout = ctx.layout_for(&project);
        if !records.is_empty() {
            let log = DeletionLog::new(layout.deletion_log_path());
            match ctx.writer().run(log.path(), || log.append(&records)) {
                WriteOutcome::Written(count) => appended += count,
                WriteOutcome::GaveUp { attempts, last_error } => {
                    error!(
                        reason = reason.as_str(),
                        path = %log.path().display(),
                        attempts,
                        lost = records.len(),
                        error = %last_error,
                        "deletion log append gave up, drained records dropped"
                    );
                    lost += records.len();
                }
            }
        }

        let outcome = match reconciler.reconcile(&layout) {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!(
                    reason = reason.as_str(),
                    project = %layout.folder_name(),
                    error = %format!("{error:#}"),
                    "reconcile failed"
                );
                None
            }
        };
        if !outcome.is_some_and(|o| o.attempted()) {
            state.unreconciled.push(project.clone());
        }
        reconciled.push(ProjectReconcile { project, outcome });
    }

    let still_dirty = if state.unreconciled.is_empty() {
        ctx.buffer().settle_after_reconcile()
    } else {
        ctx.buffer().is_dirty()
    };

    debug!(reason = reason.as_str(), appended, lost, still_dirty, "flush cycle finished");
    FlushReport::Flushed { appended, lost, reconciled, still_dirty }
}
