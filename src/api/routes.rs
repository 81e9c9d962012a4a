use crate::api::{handlers, ApiDoc};
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// Build the full application router with its middleware stack.
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config_manager.config().server.max_upload_bytes;

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/upload", post(handlers::documents::upload))
        .route("/chat", post(handlers::chat::chat))
        .route("/documents", get(handlers::documents::list_documents))
        .route("/documents/{id}", delete(handlers::documents::delete_document))
        .route("/clear", post(handlers::documents::clear))
        .route("/stats", get(handlers::documents::stats))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
