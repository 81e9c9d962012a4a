//! Retrieval augmented answering over uploaded documents.
//!
//! # Module Structure
//!
//! - [`rag::chunker`](crate::rag::chunker) - Sentence-aware sliding-window chunking
//! - [`rag::ingest`](crate::rag::ingest) - Chunk, embed, index and catalog a document
//! - [`rag::answer`](crate::rag::answer) - Retrieve context and answer questions, whole or streamed
//! - [`rag::knowledge_base`](crate::rag::knowledge_base) - Facade tying the pieces to storage
//!
//! # Pipeline
//!
//! 1. **Ingestion** - Text is normalized, chunked and embedded segment by segment
//! 2. **Storage** - Vectors go to the index, the document record to the catalog
//! 3. **Retrieval** - The question is embedded and matched against the index
//! 4. **Mode selection** - Strong matches ground the answer, otherwise the model answers directly
//! 5. **Generation** - The model's reasoning and final answer are separated
//!
//! # Example
//!
//! ```ignore
//! use kbase::rag::KnowledgeBase;
//!
//! let kb = KnowledgeBase::from_config(&config).await?;
//! kb.ingest("Rust guarantees memory safety without a garbage collector.", "rust.txt").await?;
//! let result = kb.answer("How does Rust manage memory?", 3).await?;
//! println!("{} ({})", result.final_answer, result.mode);
//! ```

pub mod answer;
pub mod chunker;
pub mod ingest;
pub mod knowledge_base;

pub use answer::{parse_model_response, AnswerConfig, AnswerEngine, AnswerStream, ParsedResponse};
pub use chunker::TextChunker;
pub use ingest::{IngestRequest, IngestionPipeline};
pub use knowledge_base::KnowledgeBase;
