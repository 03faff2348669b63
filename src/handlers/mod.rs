//! # HTTP Request Handlers
//!
//! Thin transport over the ceremonies: each handler extracts the JSON body,
//! calls one ceremony step and serialises the result. Errors render through
//! `AppError`'s `IntoResponse`.
//!
//! ## Submodules
//! - `health`: health check endpoint (for monitoring)
//! - `auth`: the four ceremony endpoints

pub mod auth;
pub mod health;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// All routes, with state attached
///
/// Cross-cutting layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint - useful for monitoring and load balancers
        .route("/health", get(health::health_check))
        // Registration flow (creating a new passkey)
        .route("/api/auth/register/start", post(auth::register_start))
        .route("/api/auth/register/finish", post(auth::register_finish))
        // Authentication flow (logging in with a passkey)
        .route("/api/auth/authenticate/start", post(auth::authenticate_start))
        .route("/api/auth/authenticate/finish", post(auth::authenticate_finish))
        .with_state(state)
}
