use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // over-limit bodies surface as a JSON rejection, which still answers 200
    let body_limit = DefaultBodyLimit::max(state.config.server.max_body_bytes);

    Router::new()
        .route("/", post(handlers::solve))
        .route("/solve", post(handlers::solve))
        .route("/health", get(handlers::health))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
