//! Server startup and graceful shutdown.

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;

use crate::state::AppState;

/// Bind and serve until a shutdown signal arrives.
pub async fn start_server(state: &AppState, app: Router) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.server.port);
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_video_mb = state.config.media.max_video_size_bytes / 1024 / 1024,
        allowed_formats = %state.config.media.allowed_formats.join(","),
        worker_concurrency = state.config.queue.worker_concurrency,
        ffmpeg_path = %state.config.media.ffmpeg_path,
        "Server ready and accepting connections"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.queue.shutdown().await;
    Ok(())
}

/// Listens for Ctrl+C (SIGINT) and SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
