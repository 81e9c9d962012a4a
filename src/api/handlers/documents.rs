//! Document management handlers.

use crate::{
    db::catalog::DEFAULT_PAGE_SIZE,
    types::{
        ActionResponse, AppError, DocumentPage, DocumentsQuery, KbStats, Result, UploadResponse,
    },
    AppState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

/// Upload a text or Markdown file and ingest it
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content_type = "multipart/form-data", description = "Multipart form with a `file` field"),
    responses(
        (status = 200, description = "Document ingested", body = UploadResponse),
        (status = 400, description = "Missing file, unsupported type or empty document"),
        (status = 413, description = "Upload exceeds the configured size limit"),
        (status = 502, description = "No segment could be embedded"),
        (status = 500, description = "Index or catalog write failed")
    ),
    tag = "documents"
)]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::InvalidInput("No file selected".to_string()))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let report = state.kb.ingest_upload(&filename, &bytes).await?;
        return Ok(Json(report.into()));
    }

    Err(AppError::InvalidInput(format!(
        "Multipart field '{}' is required",
        FILE_FIELD
    )))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// List ingested documents, newest first
#[utoipa::path(
    get,
    path = "/api/documents",
    params(
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("page_size" = Option<u32>, Query, description = "Documents per page (1-50)")
    ),
    responses(
        (status = 200, description = "One page of documents", body = DocumentPage)
    ),
    tag = "documents"
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<DocumentPage>> {
    let page = state
        .kb
        .list_documents(
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

/// Delete one document with its vectors and stored file
#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document deleted", body = ActionResponse),
        (status = 404, description = "Unknown document")
    ),
    tag = "documents"
)]
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>> {
    let document = state.kb.delete_document(&id).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("Deleted '{}'", document.display_name),
    }))
}

/// Remove every document, vector, chat entry and uploaded file
#[utoipa::path(
    post,
    path = "/api/clear",
    responses(
        (status = 200, description = "Knowledge base cleared", body = ActionResponse),
        (status = 500, description = "Some parts could not be cleared")
    ),
    tag = "documents"
)]
pub async fn clear(State(state): State<AppState>) -> Result<Json<ActionResponse>> {
    state.kb.clear_all().await?;
    Ok(Json(ActionResponse {
        success: true,
        message: "Knowledge base cleared".to_string(),
    }))
}

/// Catalog totals
#[utoipa::path(
    get,
    path = "/api/stats",
    responses(
        (status = 200, description = "Knowledge base statistics", body = KbStats)
    ),
    tag = "documents"
)]
pub async fn stats(State(state): State<AppState>) -> Result<Json<KbStats>> {
    Ok(Json(state.kb.stats().await?))
}
