use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= Knowledge Base Types =============

/// A contiguous slice of normalized source text, the unit of embedding and retrieval.
///
/// Offsets are character positions (Unicode scalar values) into the normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub length: usize,
}

/// Metadata stored alongside every vector in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub document_id: String,
    pub filename: String,
    pub sequence_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A segment together with its embedding, ready to be written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedSegment {
    /// Point identifier in the index (UUID v4)
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: SegmentMetadata,
}

/// A single hit returned by the vector index, ranked from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub metadata: SegmentMetadata,
    pub score: f32,
    pub rank: usize,
}

/// Catalog record of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: String,
    pub display_name: String,
    pub storage_path: String,
    pub segment_count: usize,
    pub vector_count: usize,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Whether every segment of a document made it into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestOutcome {
    Complete,
    Partial { skipped_segments: Vec<usize> },
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestReport {
    pub document: Document,
    pub outcome: IngestOutcome,
}

impl IngestReport {
    pub fn segments_count(&self) -> usize {
        self.document.segment_count
    }

    pub fn vectors_count(&self) -> usize {
        self.document.vector_count
    }

    /// Sequence indices of segments whose embedding failed.
    pub fn skipped_segments(&self) -> &[usize] {
        match &self.outcome {
            IngestOutcome::Complete => &[],
            IngestOutcome::Partial { skipped_segments } => skipped_segments,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Partial { .. })
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    KnowledgeGrounded,
    Direct,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::KnowledgeGrounded => "knowledge-grounded",
            AnswerMode::Direct => "direct",
        }
    }
}

impl std::fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved segment cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Source {
    pub filename: String,
    pub sequence_index: usize,
    /// Similarity score rounded to three decimals
    pub score: f32,
    pub text_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnswerResult {
    pub question: String,
    pub final_answer: String,
    /// System rationale for the chosen mode merged with the model's own reasoning
    pub thinking: String,
    pub sources: Vec<Source>,
    pub mode: AnswerMode,
    pub timestamp: DateTime<Utc>,
}

/// Messages emitted by a streamed answer, in order: one `Metadata`,
/// any number of `Fragment`s, then `Done`. A failure mid-stream arrives as
/// an `Err` item instead and ends the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Metadata {
        question: String,
        sources: Vec<Source>,
        mode: AnswerMode,
    },
    Fragment {
        fragment: String,
    },
    Done,
}

/// Entry appended to the chat log after a completed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub question: String,
    pub answer: String,
    pub mode: AnswerMode,
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
}

// ============= Catalog Types =============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KbStats {
    pub total_documents: u64,
    pub total_chunks: u64,
    pub total_vectors: u64,
    pub total_chats: u64,
    /// Points reported by the vector index, when it is reachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_points: Option<u64>,
}

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub filename: String,
    pub chunks_count: usize,
    pub vectors_count: usize,
    pub skipped_segments: Vec<usize>,
    pub message: String,
}

impl From<IngestReport> for UploadResponse {
    fn from(report: IngestReport) -> Self {
        let skipped = report.skipped_segments().to_vec();
        let message = if skipped.is_empty() {
            format!(
                "Processed {} segments into {} vectors",
                report.segments_count(),
                report.vectors_count()
            )
        } else {
            format!(
                "Processed {} of {} segments ({} skipped)",
                report.vectors_count(),
                report.segments_count(),
                skipped.len()
            )
        };
        Self {
            success: true,
            file_id: report.document.id,
            filename: report.document.display_name,
            chunks_count: report.document.segment_count,
            vectors_count: report.document.vector_count,
            skipped_segments: skipped,
            message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" when the model gateway answers, "degraded" otherwise
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub model_connected: bool,
    pub index_provider: String,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document produced no segments: {0}")]
    EmptyDocument(String),

    #[error("No segment could be embedded: {0}")]
    EmbeddingFailure(String),

    #[error("Vector index write failed: {0}")]
    IndexWrite(String),

    #[error("Question embedding failed: {0}")]
    QueryEmbedding(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Knowledge base only partially cleared (failed: {})", failed.join(", "))]
    PartialClear {
        cleared: Vec<String>,
        failed: Vec<String>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upload too large: {0}")]
    UploadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::EmptyDocument(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::EmbeddingFailure(_)
            | AppError::QueryEmbedding(_)
            | AppError::Generation(_)
            | AppError::LLM(_) => StatusCode::BAD_GATEWAY,
            AppError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_)
            | AppError::IndexWrite(_)
            | AppError::PartialClear { .. }
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::PartialClear { cleared, failed } => serde_json::json!({
                "success": false,
                "error": self.to_string(),
                "cleared": cleared,
                "failed": failed,
            }),
            _ => serde_json::json!({
                "success": false,
                "error": self.to_string(),
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
