use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_planner::api;
use delivery_planner::clock::SystemClock;
use delivery_planner::config::Config;
use delivery_planner::engine::scheduler::run_expansion_scheduler;
use delivery_planner::error::AppError;
use delivery_planner::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let http_port = config.http_port;
    let expansion_enabled = config.expansion_enabled;

    let shared_state = Arc::new(AppState::new(config, Arc::new(SystemClock)));

    if expansion_enabled {
        tokio::spawn(run_expansion_scheduler(shared_state.clone()));
    } else {
        tracing::warn!("expansion scheduler disabled; use POST /expansions");
    }

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
