use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_tracker::api;
use delivery_tracker::config::{Config, LogFormat};
use delivery_tracker::engine::assignment::run_assignment_engine;
use delivery_tracker::error::AppError;
use delivery_tracker::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let http_port = config.http_port;
    let (app_state, job_rx) = AppState::new(config)?;
    let shared_state = Arc::new(app_state);

    tracing::info!(
        policy = shared_state.assignment.policy(),
        assignment_delay_ms = shared_state.config.assignment_delay.as_millis() as u64,
        "assignment engine configured"
    );

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_assignment_engine(shared_state.clone(), job_rx));

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
