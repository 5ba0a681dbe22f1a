use std::sync::Arc;

use anyhow::{Context, Result};

use hybrid_forecast::config::Config;
use hybrid_forecast::logging::{self, LogTarget};
use hybrid_forecast::runtime::build_runtime;
use hybrid_forecast::server;
use hybrid_forecast::service::ForecastService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set FORECAST_CONFIG or run from the directory holding config/default.toml");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging.level, config.logging.format, LogTarget::Stdout);

    let limits = config.job_limits();
    let runtime = build_runtime(
        config.runtime.mode,
        config.runtime.worker_path.clone(),
        limits.grace,
    );
    let source = config.price_source()?;
    tracing::info!(
        bind = %config.server.bind,
        runtime = runtime.name(),
        source = source.name(),
        job_timeout_secs = limits.job_timeout.as_secs(),
        "Starting hybrid-forecast"
    );

    let service = Arc::new(ForecastService::new(
        config.analysis_settings(),
        config.trading_calendar()?,
        source,
        runtime,
        limits,
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    axum::serve(listener, server::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
