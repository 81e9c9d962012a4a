//! Knowledge base facade used by the HTTP layer and the CLI.
//!
//! Owns the ingestion pipeline, the answer engine and the stores they share,
//! plus the upload directory where original files are kept.

use crate::db::{CatalogDb, ChatLog, VectorStore, VectorStoreProvider};
use crate::llm::{LLMClient, Provider};
use crate::rag::answer::{AnswerConfig, AnswerEngine, AnswerStream};
use crate::rag::chunker::TextChunker;
use crate::rag::ingest::{IngestRequest, IngestionPipeline};
use crate::types::{AnswerResult, AppError, Document, DocumentPage, IngestReport, KbStats, Result};
use crate::utils::toml_config::KbConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// File extensions accepted for ingestion.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Formats that need a text extractor this server does not ship.
const EXTRACTION_REQUIRED: [&str; 3] = ["pdf", "docx", "doc"];

pub struct KnowledgeBase {
    pipeline: IngestionPipeline,
    engine: AnswerEngine,
    llm: Arc<dyn LLMClient>,
    store: Arc<dyn VectorStore>,
    catalog: Arc<CatalogDb>,
    upload_dir: PathBuf,
}

impl KnowledgeBase {
    /// Wire the components together. Fails with `AppError::Configuration`
    /// when the chunking parameters are invalid.
    pub fn new(
        config: &KbConfig,
        llm: Arc<dyn LLMClient>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<CatalogDb>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.rag.chunk_size, config.rag.chunk_overlap)?;

        let pipeline = IngestionPipeline::new(
            chunker,
            Arc::clone(&llm),
            Arc::clone(&store),
            Arc::clone(&catalog),
        );
        let chat_log: Arc<dyn ChatLog> = catalog.clone();
        let engine = AnswerEngine::new(
            Arc::clone(&llm),
            Arc::clone(&store),
            AnswerConfig::from(&config.rag),
        )
        .with_chat_log(chat_log);

        Ok(Self {
            pipeline,
            engine,
            llm,
            store,
            catalog,
            upload_dir: PathBuf::from(&config.rag.upload_dir),
        })
    }

    /// Build every component from configuration. An unreachable model
    /// service yields a degraded knowledge base; an unreachable index is an error.
    pub async fn from_config(config: &KbConfig) -> Result<Self> {
        let provider = Provider::from_config(&config.ollama);
        let llm: Arc<dyn LLMClient> = Arc::from(provider.create_client_or_unavailable().await);

        let store: Arc<dyn VectorStore> = Arc::from(
            VectorStoreProvider::from_config(&config.index, config.index_api_key())?
                .create_store()
                .await?,
        );
        let catalog = Arc::new(CatalogDb::open(&config.catalog.path).await?);

        info!(
            provider = provider.name(),
            index = store.provider_name(),
            catalog = %config.catalog.path,
            "Knowledge base initialized"
        );

        Self::new(config, llm, store, catalog)
    }

    pub fn llm(&self) -> &Arc<dyn LLMClient> {
        &self.llm
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<CatalogDb> {
        &self.catalog
    }

    pub fn engine(&self) -> &AnswerEngine {
        &self.engine
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Ingest raw text that has no stored file.
    pub async fn ingest(&self, text: &str, display_name: &str) -> Result<IngestReport> {
        self.pipeline.ingest(text, display_name).await
    }

    /// Store an uploaded file as `<uuid>.<ext>` and ingest it. The stored
    /// file is removed again if ingestion fails.
    pub async fn ingest_upload(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        let display_name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::InvalidInput("missing file name".to_string()))?
            .to_string();
        let extension = supported_extension(&display_name)?;

        let text = std::str::from_utf8(bytes)
            .map_err(|_| {
                AppError::InvalidInput(format!("'{}' is not valid UTF-8 text", display_name))
            })?
            .trim_start_matches('\u{feff}');

        let document_id = Uuid::new_v4().to_string();
        let stored = self
            .upload_dir
            .join(format!("{}.{}", document_id, extension));

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;
        tokio::fs::write(&stored, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        let request = IngestRequest::new(text, display_name)
            .with_id(document_id)
            .with_storage(stored.to_string_lossy(), bytes.len() as u64);

        match self.pipeline.ingest_request(request).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&stored).await {
                    warn!("Failed to remove {:?} after failed ingestion: {}", stored, rm);
                }
                Err(e)
            }
        }
    }

    /// Read a local file and ingest it like an upload.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::InvalidInput(format!("Cannot read {:?}: {}", path, e)))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid file name {:?}", path)))?;
        self.ingest_upload(filename, &bytes).await
    }

    pub async fn answer(&self, question: &str, top_k: usize) -> Result<AnswerResult> {
        self.engine.answer(question, top_k).await
    }

    pub async fn answer_stream(&self, question: &str, top_k: usize) -> Result<AnswerStream> {
        self.engine.answer_stream(question, top_k).await
    }

    pub async fn list_documents(&self, page: u32, page_size: u32) -> Result<DocumentPage> {
        self.catalog.list_documents(page, page_size).await
    }

    /// Remove a document's vectors, stored file and catalog record.
    pub async fn delete_document(&self, id: &str) -> Result<Document> {
        let document = self
            .catalog
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", id)))?;

        let removed = self.store.delete_document(id).await?;

        if !document.storage_path.is_empty() {
            match tokio::fs::remove_file(&document.storage_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    document_id = %id,
                    "Failed to remove stored file {}: {}",
                    document.storage_path,
                    e
                ),
            }
        }

        self.catalog.delete_document(id).await?;

        info!(document_id = %id, vectors = removed, "Document deleted");
        Ok(document)
    }

    /// Clear the vector index, catalog, chat log and uploaded files.
    ///
    /// Every part is attempted. If any of them fails the call returns
    /// `AppError::PartialClear` naming what was and was not cleared.
    pub async fn clear_all(&self) -> Result<()> {
        let mut cleared = Vec::new();
        let mut failed = Vec::new();

        let mut track = |part: &str, outcome: Result<()>| match outcome {
            Ok(()) => cleared.push(part.to_string()),
            Err(e) => {
                error!(part, "Clear failed: {}", e);
                failed.push(part.to_string());
            }
        };

        track("vector index", self.store.clear().await);
        track(
            "document catalog",
            self.catalog.clear_documents().await.map(|_| ()),
        );
        track(
            "chat history",
            self.catalog.clear_chat_history().await.map(|_| ()),
        );
        track("uploaded files", self.clear_uploads().await);

        if failed.is_empty() {
            info!("Knowledge base cleared");
            Ok(())
        } else {
            Err(AppError::PartialClear { cleared, failed })
        }
    }

    async fn clear_uploads(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AppError::Internal(format!("Failed to read upload dir: {}", e))),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read upload dir: {}", e)))?
        {
            let path = entry.path();
            if path.is_file() {
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    AppError::Internal(format!("Failed to remove {:?}: {}", path, e))
                })?;
            }
        }
        Ok(())
    }

    /// Catalog totals plus the index's own point count when it is reachable.
    pub async fn stats(&self) -> Result<KbStats> {
        let mut stats = self.catalog.stats().await?;
        stats.indexed_points = match self.store.count().await {
            Ok(count) => Some(count as u64),
            Err(e) => {
                warn!("Vector index count unavailable: {}", e);
                None
            }
        };
        Ok(stats)
    }
}

fn supported_extension(filename: &str) -> Result<String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else if EXTRACTION_REQUIRED.contains(&extension.as_str()) {
        Err(AppError::InvalidInput(format!(
            "'.{}' files need text extraction, which is not supported; upload plain text or Markdown",
            extension
        )))
    } else {
        Err(AppError::InvalidInput(format!(
            "Unsupported file type '{}'; allowed: {}",
            filename,
            SUPPORTED_EXTENSIONS.join(", ")
        )))
    }
}
