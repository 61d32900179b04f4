//! API Module
//!
//! HTTP API layer for the pipeline registry.
//! Each submodule handles endpoints for a specific audience.

pub mod admin;
pub mod error;
pub mod health;
pub mod identity;
pub mod pipeline;

use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::Registry;

/// Create the main API router with all endpoints
///
/// A non-empty `url_prefix` mounts every route below it.
pub fn create_router(registry: Arc<Registry>, url_prefix: &str) -> Router {
    let routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route(
            "/pipeline",
            post(pipeline::save_pipeline)
                .put(pipeline::update_pipeline)
                .get(pipeline::list_pipelines),
        )
        .route(
            "/pipeline/{id}",
            get(pipeline::get_pipeline).delete(pipeline::delete_pipeline),
        )
        // Admin endpoints
        .route("/admin/pipeline", get(admin::list_pipelines))
        .route("/admin/pipeline/{id}", delete(admin::delete_pipeline))
        .route(
            "/admin/pipeline/statistics/usercount",
            get(admin::pipeline_user_count),
        )
        .route(
            "/admin/pipeline/statistics/operatorusage",
            get(admin::operator_usage),
        )
        .route(
            "/admin/pipeline/permissions/reconcile",
            post(admin::reconcile_permissions),
        )
        .with_state(registry);

    let prefix = url_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        routes
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, routes)
    } else {
        Router::new().nest(&format!("/{prefix}"), routes)
    };

    app.layer(cors()).layer(TraceLayer::new_for_http())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-userid"),
            HeaderName::from_static("x-user-roles"),
        ])
}
