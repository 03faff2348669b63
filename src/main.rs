//! # Passkey Ceremony Server
//!
//! Binary entry point: configuration, logging, state, background challenge
//! cleanup and the HTTP server.

use axum::http::{header, HeaderValue, Method};
use passkey_ceremony_server::config::Config;
use passkey_ceremony_server::handlers;
use passkey_ceremony_server::state::AppState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// 1. Sets up logging (`RUST_LOG` overrides the default filter)
/// 2. Loads configuration from the environment
/// 3. Opens the database and builds the shared state
/// 4. Starts a background task purging expired challenges
/// 5. Serves the API
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_ceremony_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(rp_id = %config.rp_id, origin = %config.rp_origin, "Application state initialized");

    // Unconsumed challenges are rejected once expired anyway; this only
    // keeps the table from growing.
    let ledger = app_state.ledger.clone();
    let cleanup_interval = config.cleanup_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            match ledger.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired challenges removed"),
                Err(e) => tracing::error!("Challenge cleanup failed: {:?}", e),
            }
        }
    });

    // Only the relying-party origin may call the API from a browser
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.rp_origin)?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = handlers::router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
