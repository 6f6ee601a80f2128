mod state;

use anyhow::Context;
use state::DaemonState;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = DaemonState::initialize()
        .await
        .context("failed to initialize mailsweep daemon")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(err) => tracing::error!(error = %err, "failed to listen for ctrl-c"),
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(
        tick_secs = state.config.scheduler.tick_secs,
        "starting automation scheduler"
    );
    state.engine.scheduler().run(shutdown_rx).await;

    Ok(())
}
