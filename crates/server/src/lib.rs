//! Courier Chat Server Library
//!
//! Server-mediated one-to-one chat: an HTTP auth surface plus a WebSocket
//! relay with an in-memory message log and live presence.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod relay;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use auth::AuthManager;
use config::{AppState, ServerConfig};
use handlers::{get_history, list_users, login, logout, me, signup};
use relay::RelayManager;
use ws::ws_handler;

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== Courier Server ===");
    info!("Features: Auth | Message Relay | Presence");

    let config = ServerConfig::from_env();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    // Initialize Auth Manager
    let auth = Arc::new(AuthManager::new(&config.data_dir).await?);
    info!("Auth Manager initialized");

    // Initialize the relay core
    let relay = Arc::new(RelayManager::new());
    info!("Relay core initialized");

    // Create app state
    let app_state = AppState { relay, auth };

    let app = Router::new()
        // Auth endpoints
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        // Query surface for the chat pages
        .route("/users", get(list_users))
        .route("/history/{peer}", get(get_history))
        // Live channel
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    info!("Listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Courier Chat Server"
}
