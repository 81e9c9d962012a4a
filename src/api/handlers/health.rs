use crate::{types::HealthResponse, AppState};
use axum::{extract::State, Json};
use chrono::Utc;

/// Report model gateway reachability and the configured models
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm = state.kb.llm();
    let model_connected = llm.check_connection().await;

    Json(HealthResponse {
        status: if model_connected { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chat_model: llm.model_name().to_string(),
        embedding_model: llm.embedding_model_name().to_string(),
        model_connected,
        index_provider: state.kb.store().provider_name().to_string(),
    })
}
