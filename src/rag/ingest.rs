//! Ingestion pipeline: chunk, embed, index, record.
//!
//! Embedding is best effort per segment. A document becomes searchable as
//! long as at least one segment embeds; the segments that failed are listed
//! in the returned [`IngestReport`]. Index writes and catalog creation are all
//! or nothing: a failure in either leaves neither vectors nor a catalog record.

use crate::db::{CatalogDb, VectorStore};
use crate::llm::LLMClient;
use crate::rag::chunker::TextChunker;
use crate::types::{
    AppError, Document, EmbeddedSegment, IngestOutcome, IngestReport, Result, SegmentMetadata,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A document ready to be ingested.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document_id: String,
    pub display_name: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub text: String,
}

impl IngestRequest {
    /// Plain text with no stored file behind it.
    pub fn new(text: impl Into<String>, display_name: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            document_id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            storage_path: String::new(),
            size_bytes: text.len() as u64,
            text,
        }
    }

    pub fn with_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = document_id.into();
        self
    }

    pub fn with_storage(mut self, storage_path: impl Into<String>, size_bytes: u64) -> Self {
        self.storage_path = storage_path.into();
        self.size_bytes = size_bytes;
        self
    }
}

pub struct IngestionPipeline {
    chunker: TextChunker,
    llm: Arc<dyn LLMClient>,
    store: Arc<dyn VectorStore>,
    catalog: Arc<CatalogDb>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: TextChunker,
        llm: Arc<dyn LLMClient>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<CatalogDb>,
    ) -> Self {
        Self {
            chunker,
            llm,
            store,
            catalog,
        }
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    /// Ingest raw text under `display_name`.
    pub async fn ingest(&self, text: &str, display_name: &str) -> Result<IngestReport> {
        self.ingest_request(IngestRequest::new(text, display_name))
            .await
    }

    pub async fn ingest_request(&self, request: IngestRequest) -> Result<IngestReport> {
        let started = Instant::now();

        let segments = self.chunker.split(&request.text);
        if segments.is_empty() {
            return Err(AppError::EmptyDocument(format!(
                "'{}' contains no text",
                request.display_name
            )));
        }

        let ingested_at = Utc::now();
        let dimensions = self.store.dimensions();
        let mut embedded = Vec::with_capacity(segments.len());
        let mut skipped = Vec::new();

        // sequential so the skipped list and point order follow chunk order
        for segment in &segments {
            let vector = match self.llm.embed(&segment.text).await {
                Ok(vector) if vector.len() == dimensions => vector,
                Ok(vector) => {
                    warn!(
                        document_id = %request.document_id,
                        segment = segment.sequence_index,
                        got = vector.len(),
                        expected = dimensions,
                        "Embedding has wrong dimensionality, skipping segment"
                    );
                    skipped.push(segment.sequence_index);
                    continue;
                }
                Err(e) => {
                    warn!(
                        document_id = %request.document_id,
                        segment = segment.sequence_index,
                        "Embedding failed, skipping segment: {}",
                        e
                    );
                    skipped.push(segment.sequence_index);
                    continue;
                }
            };

            embedded.push(EmbeddedSegment {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata: SegmentMetadata {
                    document_id: request.document_id.clone(),
                    filename: request.display_name.clone(),
                    sequence_index: segment.sequence_index,
                    text: segment.text.clone(),
                    start_offset: segment.start_offset,
                    end_offset: segment.end_offset,
                    ingested_at,
                },
            });
        }

        if embedded.is_empty() {
            return Err(AppError::EmbeddingFailure(format!(
                "all {} segments of '{}' failed to embed",
                segments.len(),
                request.display_name
            )));
        }

        let written = self.store.upsert(&embedded).await.map_err(|e| match e {
            AppError::IndexWrite(msg) => AppError::IndexWrite(msg),
            other => AppError::IndexWrite(other.to_string()),
        })?;

        let document = Document {
            id: request.document_id.clone(),
            display_name: request.display_name.clone(),
            storage_path: request.storage_path.clone(),
            segment_count: segments.len(),
            vector_count: written,
            size_bytes: request.size_bytes,
            uploaded_at: ingested_at,
        };

        if let Err(e) = self.catalog.add_document(&document).await {
            if let Err(rollback) = self.store.delete_document(&document.id).await {
                error!(
                    document_id = %document.id,
                    "Failed to remove vectors after catalog error: {}",
                    rollback
                );
            }
            return Err(e);
        }

        let outcome = if skipped.is_empty() {
            IngestOutcome::Complete
        } else {
            IngestOutcome::Partial {
                skipped_segments: skipped,
            }
        };

        info!(
            document_id = %document.id,
            filename = %document.display_name,
            segments = document.segment_count,
            vectors = document.vector_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Document ingested"
        );

        Ok(IngestReport { document, outcome })
    }
}
