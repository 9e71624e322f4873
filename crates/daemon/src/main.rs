// deltrackd: standalone host bridge entry point.

use anyhow::Context;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting standalone deletion tracker");
    deltrack_daemon::runtime::run_standalone()
        .await
        .context("standalone tracker terminated unexpectedly")
}
