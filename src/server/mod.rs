pub mod health;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::JobRegistry;
use crate::models::DaemonConfig;
use crate::storage::RecordStore;

/// Shared application state for the Axum server.
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub record_store: Arc<dyn RecordStore>,
    pub config: Arc<DaemonConfig>,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/devices",
            get(routes::list_devices).post(routes::create_device),
        )
        .route(
            "/api/devices/{id}",
            get(routes::get_device)
                .put(routes::update_device)
                .delete(routes::delete_device),
        )
        .route(
            "/api/tagsets",
            get(routes::list_tag_sets).post(routes::create_tag_set),
        )
        .route(
            "/api/tagsets/{id}",
            get(routes::get_tag_set)
                .put(routes::update_tag_set)
                .delete(routes::delete_tag_set),
        )
        .route(
            "/api/trends",
            get(routes::list_trends).post(routes::start_trend),
        )
        .route(
            "/api/trends/{id}",
            get(routes::get_trend).delete(routes::delete_trend),
        )
        .route("/api/trends/{id}/stop", post(routes::stop_trend))
        .route("/api/samples", get(routes::recent_samples))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
