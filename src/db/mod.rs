//! Vector index adapters and the document catalog.
//!
//! - **Vector stores**: segment embeddings, searched by cosine similarity
//! - **Catalog**: libsql tables for uploaded documents and the chat log
//!
//! Enable the Qdrant backend via Cargo features:
//! ```toml
//! kbase-server = { version = "*", features = ["qdrant"] }
//! ```

#![allow(missing_docs)]

// Vector store abstraction layer
pub mod vectorstore;

#[cfg(feature = "qdrant")]
pub mod qdrant;

// Relational catalog
pub mod catalog;

// Re-exports
pub use catalog::{CatalogDb, ChatLog};
pub use vectorstore::{InMemoryVectorStore, VectorStore, VectorStoreProvider};

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
