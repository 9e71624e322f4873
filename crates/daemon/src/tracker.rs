// Tracker: the object a host talks to.
//
// Built once at startup after the access check, it records deletions from
// change notifications, exports snapshots on open/sync/save, and runs the
// flush cycle from those notifications, from the periodic timer and once
// more at shutdown. Host-facing methods never return errors; failures are
// logged and show up only as stale or missing tables.

use std::sync::{Arc, Mutex};

use chrono::Local;
use deltrack_common::types::{format_timestamp, DeletionRecord, ElementId};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::access::{AccessDecision, AccessGate, Identity};
use crate::config::TrackerConfig;
use crate::context::TrackerContext;
use crate::flush::ticker::{FlusherHandle, IntervalTicker, PeriodicFlusher, TickSource};
use crate::flush::{flush_if_dirty, FlushReason, FlushReport};
use crate::host::DocumentModel;
use crate::store::retry::{RetryingFileWriter, WriteOutcome};
use crate::store::snapshot::SnapshotExporter;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("user `{user}` on host `{host}` is not listed in any allowlist")]
    AccessDenied { user: String, host: String },

    #[error("allowlist check failed: {0:#}")]
    Allowlist(anyhow::Error),
}

pub struct Tracker {
    ctx: Arc<TrackerContext>,
    snapshots: SnapshotExporter,
    flusher: Mutex<Option<FlusherHandle>>,
}

impl Tracker {
    /// Check access, then start tracking with the configured flush interval.
    pub fn start(
        config: &TrackerConfig,
        identity: &Identity,
        runtime: &Handle,
    ) -> Result<Self, StartupError> {
        let period = config.flush_interval();
        let ticker = {
            let _entered = runtime.enter();
            IntervalTicker::new(period)
        };
        Self::start_with_ticker(config, identity, ticker, runtime)
    }

    pub fn start_with_ticker<T: TickSource>(
        config: &TrackerConfig,
        identity: &Identity,
        ticker: T,
        runtime: &Handle,
    ) -> Result<Self, StartupError> {
        let gate = AccessGate::new(config.allowlist_dir());
        let prefix = match gate.check(identity).map_err(StartupError::Allowlist)? {
            AccessDecision::Allowed { prefix, .. } => prefix,
            AccessDecision::Denied => {
                return Err(StartupError::AccessDenied {
                    user: identity.user_name.clone(),
                    host: identity.host_name.clone(),
                })
            }
        };

        let writer = RetryingFileWriter::new(config.retry_policy());
        let ctx = Arc::new(TrackerContext::new(config.shared_root.clone(), prefix, writer));
        let flusher = PeriodicFlusher::spawn(Arc::clone(&ctx), ticker, runtime);

        info!(
            prefix = %ctx.operator_prefix(),
            shared_root = %ctx.shared_root().display(),
            "deletion tracker started"
        );
        Ok(Self { ctx, snapshots: SnapshotExporter::new(writer), flusher: Mutex::new(Some(flusher)) })
    }

    pub fn context(&self) -> &Arc<TrackerContext> {
        &self.ctx
    }

    pub fn opened(&self, document: Arc<dyn DocumentModel>) {
        self.activate_and_export(document, FlushReason::Opened);
    }

    pub fn synchronized(&self, document: Arc<dyn DocumentModel>) {
        self.activate_and_export(document, FlushReason::Synchronized);
    }

    pub fn saved(&self, document: Arc<dyn DocumentModel>) {
        self.activate_and_export(document, FlushReason::Saved);
    }

    /// Record one deletion per id. No I/O happens here.
    pub fn changed(&self, document: &dyn DocumentModel, deleted_ids: &[ElementId]) {
        if deleted_ids.is_empty() {
            return;
        }
        let project_name = document.project_name();
        let timestamp = format_timestamp(&Local::now());
        let user_name = document.user_name();

        let added = self.ctx.buffer().record_batch(deleted_ids.iter().map(|&element_id| {
            DeletionRecord {
                project_name: project_name.clone(),
                timestamp: timestamp.clone(),
                element_id,
                user_name: user_name.clone(),
            }
        }));
        debug!(project = %project_name, count = added, "deletions recorded");
    }

    /// Stop the timer, then run one last flush if anything is pending.
    pub fn shutdown(&self) -> FlushReport {
        if let Some(flusher) = self.flusher.lock().unwrap_or_else(|p| p.into_inner()).take() {
            flusher.shutdown();
        }
        let report = flush_if_dirty(&self.ctx, FlushReason::Shutdown);
        info!(?report, "deletion tracker stopped");
        report
    }

    /// Flushes first and exports after, not the other way round: pending
    /// deletions must be joined against the previous snapshot, because the
    /// new one no longer contains the deleted items.
    fn activate_and_export(&self, document: Arc<dyn DocumentModel>, reason: FlushReason) {
        let layout = self.ctx.layout_for(&document.project_name());
        self.ctx.set_active_document(Arc::clone(&document));

        let report = flush_if_dirty(&self.ctx, reason);
        debug!(reason = reason.as_str(), ?report, "notification flush");

        if let WriteOutcome::GaveUp { attempts, last_error } =
            self.snapshots.export(document.as_ref(), &layout)
        {
            warn!(
                reason = reason.as_str(),
                project = %layout.folder_name(),
                attempts,
                error = %last_error,
                "snapshot export gave up"
            );
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.get_mut().unwrap_or_else(|p| p.into_inner()).take() {
            flusher.shutdown();
        }
    }
}
