//! VODForge - Twitch VOD discovery and triage service
//!
//! Tracks a set of streamers, polls Twitch for their completed
//! broadcasts, and serves the recorded VODs over a small REST API so
//! they can be triaged for clipping.

mod api;
mod config;
mod db;
mod jobs;
mod services;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::jobs::VodWorker;
use crate::services::TwitchClient;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vodforge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VODForge");

    let db = Database::connect(&config.database_path).await?;
    db.init_schema().await?;
    tracing::info!(path = %config.database_path, "Database ready");

    let twitch = TwitchClient::new(
        config.twitch_client_id.clone(),
        config.twitch_client_secret.clone(),
    )?;

    let worker = VodWorker::spawn(
        db.clone(),
        twitch,
        Duration::from_secs(config.poll_interval_secs),
        config.retention_days,
    );

    let state = AppState { db };

    let app = Router::new()
        .merge(api::health::router())
        .nest("/api", api::streamers::router().merge(api::vods::router()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server is down; stop the ingestion worker before exiting
    worker.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
