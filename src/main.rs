//! Engine server binary: configuration, wiring, and the serve loop.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aistudio_engine::config::Config;
use aistudio_engine::engine::{GenerationEngine, PlaceholderBackend};
use aistudio_engine::metrics;
use aistudio_engine::monitor::sampler::NoAccelerator;
use aistudio_engine::server::{create_router, state::AppState};
use aistudio_engine::shutdown::GracefulShutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::load()?;
    info!(
        host = %config.server_host,
        port = config.server_port,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Starting generation engine"
    );

    let metrics_handle = metrics::install_recorder()?;

    let backend = Arc::new(PlaceholderBackend::new(
        config.export_directory.join("outputs"),
    ));
    let engine = GenerationEngine::new(config.clone(), backend, Arc::new(NoAccelerator));

    // Background sampling runs until shutdown cancels it.
    let sampler_cancel = CancellationToken::new();
    let sampler_task = tokio::spawn(Arc::clone(engine.monitor()).run(sampler_cancel.clone()));

    let shutdown = Arc::new(GracefulShutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown.listen_for_signals().await });
    }

    let state = AppState::new(Arc::clone(&engine), metrics_handle);
    let app = create_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Listening");

    let signal = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(signal.wait())
        .await?;

    info!("Server stopped, draining background tasks");
    sampler_cancel.cancel();
    if let Err(e) = sampler_task.await {
        error!(error = %e, "Sampler task join failed");
    }

    // Persist what the sampler collected during this run.
    if let Err(e) = engine.export_hardware_metrics() {
        error!(error = %e, "Final hardware-metrics export failed");
    }

    info!("Shutdown complete");
    Ok(())
}
