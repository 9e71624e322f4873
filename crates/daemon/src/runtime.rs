// Standalone host bridge: host notifications arrive as JSON lines on stdin.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::access::Identity;
use crate::config::TrackerConfig;
use crate::flush::FlushReport;
use crate::host::HostEvent;
use crate::tracker::Tracker;

pub async fn run_standalone() -> Result<()> {
    let config = TrackerConfig::load();
    let identity = Identity::current();
    let tracker = Tracker::start(&config, &identity, &Handle::current())
        .context("deletion tracker refused to start")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = ctrl_c_tx.send(());
    });

    info!(shared_root = %config.shared_root.display(), "standalone tracker started");
    let input = BufReader::new(tokio::io::stdin());
    let report = serve_until_shutdown(Arc::new(tracker), input, shutdown_rx).await?;
    info!(?report, "standalone tracker finished");
    Ok(())
}

/// Feed host events from `input` to the tracker until the input ends, a
/// `shutdown` event arrives or `shutdown_rx` fires. Always finishes with the
/// tracker's own shutdown flush.
pub async fn serve_until_shutdown<R>(
    tracker: Arc<Tracker>,
    input: R,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<FlushReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read host notification")? else {
                    debug!("host input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event: HostEvent = match serde_json::from_str(line) {
                    Ok(event) => event,
                    Err(error) => {
                        warn!(%error, "ignoring malformed host notification");
                        continue;
                    }
                };
                if matches!(event, HostEvent::Shutdown) {
                    break;
                }
                dispatch(&tracker, event).await?;
            }
        }
    }

    tokio::task::spawn_blocking(move || tracker.shutdown())
        .await
        .context("shutdown flush task failed")
}

// Handlers may sleep through retry backoffs, so they run on the blocking pool.
async fn dispatch(tracker: &Arc<Tracker>, event: HostEvent) -> Result<()> {
    let kind = event.kind();
    let tracker = Arc::clone(tracker);
    tokio::task::spawn_blocking(move || match event {
        HostEvent::Opened { document } => tracker.opened(Arc::new(document)),
        HostEvent::Changed { document, deleted_ids } => tracker.changed(&document, &deleted_ids),
        HostEvent::Synchronized { document } => tracker.synchronized(Arc::new(document)),
        HostEvent::Saved { document } => tracker.saved(Arc::new(document)),
        HostEvent::Shutdown => {}
    })
    .await
    .with_context(|| format!("`{kind}` handler failed"))
}
