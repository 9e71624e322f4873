// Periodic flush driver.
//
// A `TickSource` decides when to check the dirty flag; the flusher task
// runs each due cycle on the blocking pool so retry backoffs never stall
// the runtime. Shutdown is a broadcast, mirroring the daemon runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{flush_if_dirty, FlushReason, FlushReport};
use crate::context::TrackerContext;

/// Source of flush-check ticks. Returns `false` once no more ticks will come.
pub trait TickSource: Send + 'static {
    fn tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Wall-clock ticks every `period`, first one a full period after start.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Must be called from within a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        // A slow cycle pushes the next check back instead of bunching ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl TickSource for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks on demand, for driving the flusher deterministically.
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug, Clone)]
pub struct TickTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl TickTrigger {
    /// Returns `false` if the flusher is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl ManualTicker {
    pub fn channel() -> (TickTrigger, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TickTrigger { tx }, Self { rx })
    }
}

impl TickSource for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

pub struct FlusherHandle {
    shutdown_tx: broadcast::Sender<()>,
    ticks_handled: watch::Receiver<u64>,
    task: Option<JoinHandle<()>>,
}

impl FlusherHandle {
    /// Ask the loop to stop. An in-flight cycle finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of ticks the loop has fully handled so far.
    pub fn ticks_handled(&self) -> watch::Receiver<u64> {
        self.ticks_handled.clone()
    }

    pub async fn wait(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for FlusherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct PeriodicFlusher;

impl PeriodicFlusher {
    pub fn spawn<T: TickSource>(
        ctx: Arc<TrackerContext>,
        mut ticker: T,
        runtime: &Handle,
    ) -> FlusherHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
        let (handled_tx, handled_rx) = watch::channel(0u64);

        let task = runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    alive = ticker.tick() => {
                        if !alive {
                            break;
                        }
                        if ctx.buffer().is_dirty() {
                            run_cycle(Arc::clone(&ctx)).await;
                        }
                        handled_tx.send_modify(|n| *n += 1);
                    }
                }
            }
            info!("periodic flusher stopped");
        });

        FlusherHandle { shutdown_tx, ticks_handled: handled_rx, task: Some(task) }
    }
}

async fn run_cycle(ctx: Arc<TrackerContext>) {
    match tokio::task::spawn_blocking(move || flush_if_dirty(&ctx, FlushReason::Tick)).await {
        Ok(FlushReport::Flushed { appended, lost, still_dirty, .. }) => {
            debug!(appended, lost, still_dirty, "timer flush done");
        }
        Ok(report) => debug!(?report, "timer flush skipped"),
        Err(error) => warn!(?error, "timer flush task failed"),
    }
}
