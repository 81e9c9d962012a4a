//! HTTP API Handlers and Routes
//!
//! The REST layer for kbase, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! - `GET /api/health` - Model gateway reachability and configured models
//! - `POST /api/upload` - Upload a `.txt` or `.md` file (multipart field `file`)
//! - `POST /api/chat` - Ask a question; `stream: true` switches to Server-Sent Events
//! - `GET /api/documents` - List documents (`page`, `page_size`)
//! - `DELETE /api/documents/{id}` - Delete a document
//! - `POST /api/clear` - Clear the whole knowledge base
//! - `GET /api/stats` - Catalog statistics
//! - `GET /api/openapi.json` - OpenAPI description of the above
//!
//! Errors are returned as `{"success": false, "error": "..."}` with a status
//! code derived from [`AppError`](crate::types::AppError).

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use crate::types::{
    ActionResponse, AnswerMode, AnswerResult, ChatRequest, Document, DocumentPage, HealthResponse,
    KbStats, Pagination, Source, UploadResponse,
};
use utoipa::OpenApi;

/// OpenAPI description of the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(title = "kbase", description = "Local knowledge-base server"),
    paths(
        handlers::health::health,
        handlers::chat::chat,
        handlers::documents::upload,
        handlers::documents::list_documents,
        handlers::documents::delete_document,
        handlers::documents::clear,
        handlers::documents::stats,
    ),
    components(schemas(
        ActionResponse,
        AnswerMode,
        AnswerResult,
        ChatRequest,
        Document,
        DocumentPage,
        HealthResponse,
        KbStats,
        Pagination,
        Source,
        UploadResponse,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "chat", description = "Question answering"),
        (name = "documents", description = "Document management"),
    )
)]
pub struct ApiDoc;
