pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::handlers::chat;
use crate::routes::{credentials, health, threads};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json));

    let protected = Router::new()
        // Chat
        .route("/chat", post(chat::chat))
        .route("/chat/branch-off/:message_id", put(chat::branch_off))
        // Threads
        .route("/thread", get(threads::list_threads).delete(threads::delete_threads))
        .route(
            "/thread/:thread_id",
            get(threads::get_thread)
                .patch(threads::rename_thread)
                .delete(threads::delete_thread),
        )
        // Credentials
        .route("/credential", get(credentials::list_credentials))
        .route("/credential/:credential_id", delete(credentials::delete_credential))
        .layer(from_fn_with_state(state.clone(), middleware::auth::require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(from_fn(middleware::logging::log_request))
        .layer(TimeoutLayer::new(Duration::from_secs(state.config.server.request_timeout_secs)))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors.allow_origin(Any)
        } else {
            let parsed_origins: Vec<axum::http::HeaderValue> = config
                .cors
                .origins
                .iter()
                .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
                .collect();

            cors.allow_origin(parsed_origins)
        }
    } else {
        CorsLayer::permissive()
    }
}
