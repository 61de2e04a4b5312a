// Library exports for corkboard
// Integration tests drive the same router the binary serves

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod store;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Headroom for the text fields that travel with an upload.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let body_limit = state
        .config
        .uploads
        .max_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(routes::home::index))
        .route("/assets/{*path}", get(routes::assets::serve))
        .merge(routes::auth::router())
        .merge(routes::posts::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
