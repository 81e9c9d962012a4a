//! # kbase - Local Knowledge-Base Server
//!
//! Upload plain-text documents, index them as embedded segments and ask
//! questions answered from the indexed material, falling back to the model's
//! general knowledge when nothing relevant is stored.
//!
//! ## Overview
//!
//! kbase can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `kbase-server` binary
//! 2. **As a library** - Embed the pipeline and engine in your own project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use kbase::{KbConfig, KnowledgeBase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KbConfig::load_or_default("kbase.toml")?;
//!     let kb = KnowledgeBase::from_config(&config).await?;
//!
//!     kb.ingest("The office opens at 9am on weekdays.", "hours.txt").await?;
//!     let result = kb.answer("When does the office open?", 0).await?;
//!     println!("{}", result.final_answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama embeddings and chat (default) |
//! | `qdrant` | Qdrant vector index (default) |
//!
//! Building with `--no-default-features` leaves the in-memory index and a
//! model gateway that reports every call as unavailable.
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`cli`] - Command-line parsing and colored output
//! - [`db`] - Vector index adapters and the document catalog
//! - [`llm`] - Model gateway clients
//! - [`rag`] - Chunking, ingestion and answering
//! - [`types`] - Common types and error handling
//! - [`utils`] - TOML configuration with hot reloading

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// Vector index and document catalog.
pub mod db;
/// Model gateway clients.
pub mod llm;
/// Retrieval augmented answering.
pub mod rag;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use db::{CatalogDb, InMemoryVectorStore, VectorStore, VectorStoreProvider};
pub use llm::{LLMClient, Provider};
pub use rag::{AnswerEngine, IngestionPipeline, KnowledgeBase, TextChunker};
pub use types::{AppError, Result};
pub use utils::toml_config::{ConfigManager, KbConfig};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<ConfigManager>,
    /// Ingestion, retrieval and catalog operations
    pub kb: Arc<KnowledgeBase>,
}
