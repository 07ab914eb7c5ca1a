//! Coin Playlist Service
//!
//! Keeps an offline SQLite copy of a remote video playlist and serves it as a live,
//! always-available view. Network refreshes write the cache; readers only see the cache.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod holder;
mod models;
mod remote;
mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::SqliteStore;
use holder::PlaylistHolder;
use remote::HttpRemoteSource;
use sync::{RetryPolicy, SyncRepository};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub holder: Arc<PlaylistHolder>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Coin Playlist Service");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Remote playlist: {}", config.remote_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (COIN_API_PSK). Manual refresh is unauthenticated!");
    }
    if config.refresh_max_retries > 0 {
        tracing::info!(
            "Transient fetch failures retried up to {} times",
            config.refresh_max_retries
        );
    }

    // Offline cache
    let pool = db::init_database(&config.db_path).await?;
    let store = SqliteStore::open(pool).await?;
    let cached = store.revision_info();
    tracing::info!(
        "Offline cache holds {} coins (revision {})",
        cached.item_count,
        cached.revision_id
    );

    // Remote source and repository
    let remote = HttpRemoteSource::new(config.remote_url.clone(), config.remote_timeout)?;
    let repo = SyncRepository::new(Arc::new(store.clone()), Arc::new(remote)).with_retry(
        RetryPolicy::new(config.refresh_max_retries, config.refresh_backoff),
    );

    // Starts the initial refresh in the background
    let holder = Arc::new(PlaylistHolder::new(Arc::new(repo)));

    let state = AppState {
        holder: Arc::clone(&holder),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    holder.shutdown();
    store.close().await;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();
    let playlist = state.holder.playlist();

    // Refresh hits the network, so it sits behind the PSK
    let refresh_routes = Router::new()
        .route("/playlist/refresh", post(api::refresh_playlist))
        .layer(middleware::from_fn(move |req, next| {
            auth::require_refresh_key(psk.clone(), playlist.revision_id(), req, next)
        }));

    let api_routes = Router::new()
        .route("/playlist", get(api::get_playlist))
        .route("/playlist/revision", get(api::get_revision))
        .route("/playlist/status", get(api::get_refresh_status))
        .merge(refresh_routes);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[cfg(test)]
mod testing;
