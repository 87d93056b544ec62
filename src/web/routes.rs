//! Route definitions for the catalog server

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::AppState;

use super::api;
use super::generate;

/// Create the main router with all routes
pub fn create_router(app_state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = if config.cors_enabled {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let panoramas = ServeDir::new(app_state.catalog.root());

    Router::new()
        // Catalog API (JSON)
        .route("/api/status", get(api::get_status))
        .route("/api/panorama_list", get(api::list_panoramas))
        .route("/api/panorama/:id", get(api::get_panorama))
        .route("/api/update_config", post(api::update_config))
        // Generation
        .route(
            "/api/submit_prompt",
            post(generate::submit_prompt).fallback(generate::method_not_allowed),
        )
        // Panorama files (config.json, image.png, depth.png)
        .nest_service("/panoramas", panoramas)
        // Static pages
        .fallback_service(ServeDir::new(&config.static_dir))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
