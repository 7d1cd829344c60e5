use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/agent/status", get(handlers::agent_status))
        .route("/api/programs", get(handlers::list_programs))
        .route("/api/programs", post(handlers::enqueue_program))
        .route("/api/programs/:id", get(handlers::get_program))
        .route("/api/programs/:id", delete(handlers::delete_program))
        .route("/api/programs/:id/idl", get(handlers::get_program_idl))
        .route("/api/programs/:id/idl", post(handlers::upload_idl))
        .route("/api/queue", get(handlers::get_queue))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
