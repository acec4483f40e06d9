//! Signalcast entry point.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use signalcast::config::Config;
use signalcast::health::health_check;
use signalcast::invite::InviteLedger;
use signalcast::room::RoomRegistry;
use signalcast::ws::{handler as ws_handler, Broker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalcast=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting signalcast"
    );

    let rooms = Arc::new(RoomRegistry::new());
    let invites = Arc::new(InviteLedger::new(config.invite_timeout));
    let config = Arc::new(config);

    let broker = Broker {
        rooms: rooms.clone(),
        invites: invites.clone(),
        config: config.clone(),
    };

    spawn_sweep_task(rooms, invites, config.sweep_interval);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(broker);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodic fallback sweep for invites whose deadline task was lost (§4.5
/// `SweepExpired`, §9 "the periodic sweep is a safety net").
fn spawn_sweep_task(
    rooms: Arc<RoomRegistry>,
    invites: Arc<InviteLedger>,
    interval: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            invites.sweep_expired(&rooms).await;
        }
    });
}
