//! Stream Controller
//!
//! Entry point for the stream control service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stream_controller::auth::token::TokenIssuer;
use stream_controller::config::Config;
use stream_controller::observability::metrics::init_metrics_recorder;
use stream_controller::routes::{self, AppState};
use stream_controller::services::ControlClient;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stream Controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        livekit_url = %config.livekit_url,
        bind_address = %config.bind_address,
        room_conflict_policy = ?config.room_conflict_policy,
        viewer_can_publish = config.viewer_can_publish,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    let issuer = Arc::new(
        TokenIssuer::new(&config.api_key, &config.api_secret).map_err(|e| {
            error!("Failed to initialize token issuer: {}", e);
            e
        })?,
    );

    let control = ControlClient::new(
        &config.livekit_url,
        issuer.clone(),
        Duration::from_secs(config.control_request_timeout_seconds),
    )
    .map_err(|e| {
        error!("Failed to build control client: {}", e);
        e
    })?;
    info!(base_url = %control.base_url(), "Control client ready");

    let state = Arc::new(AppState::new(&config, issuer, Arc::new(control)));
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Stream Controller listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.drain_seconds))
        .await?;

    info!("Stream Controller shutdown complete");

    Ok(())
}

/// Returns once SIGINT or SIGTERM has arrived and the drain period is over.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (SC_DRAIN_SECONDS=0)");
    }
}
