use anyhow::{Context, Result};
use navia_core::LoopExit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod adapters;
mod config;
mod console;
mod display;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("naviad starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_device,
        replay = ?config.replay_dir,
        gallery = %config.gallery_dir.display(),
        models = %config.model_dir.display(),
        threshold = config.distance_threshold,
        "configuration loaded"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handle = engine::spawn_loop(config, shutdown.clone())?;
    let known = handle.ready().await.context("failed to start frame loop")?;
    tracing::info!(known, "naviad ready");

    let finished = handle.finished();
    tokio::pin!(finished);

    let outcome = tokio::select! {
        outcome = &mut finished => outcome?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            // The loop notices at the end of its current cycle.
            tracing::info!("naviad shutting down");
            shutdown.store(true, Ordering::SeqCst);
            finished.await?
        }
    };

    tracing::info!(exit = ?outcome.exit, cycles = outcome.cycles, "frame loop stopped");
    if outcome.exit == LoopExit::CaptureFailed {
        anyhow::bail!("frame capture failed");
    }
    Ok(())
}
