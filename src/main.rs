use std::sync::Arc;

use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

use dispatch_tracker::api;
use dispatch_tracker::api::grpc::{GrpcTrackingService, TrackingServiceServer};
use dispatch_tracker::config::{Config, LogFormat};
use dispatch_tracker::engine::presence::run_presence_sweeper;
use dispatch_tracker::error::AppError;
use dispatch_tracker::relay::run_fanout;
use dispatch_tracker::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let (app_state, location_rx) = AppState::new(config.clone());
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    let fanout = tokio::spawn(run_fanout(shared_state.clone(), location_rx));
    let sweeper = tokio::spawn(run_presence_sweeper(shared_state.clone()));

    let grpc_addr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .map_err(|err| AppError::Internal(format!("invalid grpc address: {err}")))?;
    let grpc_service = GrpcTrackingService::new(shared_state.clone());

    let grpc = tokio::spawn(async move {
        tracing::info!(grpc_port = %grpc_addr, "grpc server started");
        if let Err(err) = TonicServer::builder()
            .add_service(TrackingServiceServer::new(grpc_service))
            .serve_with_shutdown(grpc_addr, shutdown_signal())
            .await
        {
            tracing::error!(error = %err, "grpc server failed");
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    sweeper.abort();
    fanout.abort();
    let _ = grpc.await;
    tracing::info!("shutdown complete");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::new(config.log_level.clone());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
