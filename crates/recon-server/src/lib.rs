//! recon-server: local HTTP control plane over recon-core
//!
//! Serves a single [`Reconciler`](recon_core::Reconciler): clients upload the
//! two files, post the rules, poll progress and fetch exports.

pub mod error;
pub mod handlers;
pub mod state;
pub mod types;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

pub use error::ApiError;
pub use state::{AppState, ServerConfig};

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/compare", post(handlers::compare))
        .route("/stats", get(handlers::stats))
        .route("/progress", get(handlers::progress))
        .route("/cancel", post(handlers::cancel))
        .route("/export", post(handlers::export))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
