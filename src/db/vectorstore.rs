//! Vector Index Abstraction Layer
//!
//! Each store manages exactly one collection of segment vectors, fixed at
//! construction time, so callers never pass collection names around.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    VectorStore Trait                      │
//! ├──────────────────────────────────────────────────────────┤
//! │ upsert │ search │ delete_document │ clear │ count │ ...  │
//! └──────────────────────────────────────────────────────────┘
//!              ▲                               ▲
//!        ┌─────┴─────┐                   ┌─────┴─────┐
//!        │  Qdrant   │                   │ In-memory │
//!        │ (default) │                   │  (tests)  │
//!        └───────────┘                   └───────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kbase::db::vectorstore::{VectorStore, VectorStoreProvider};
//!
//! let store = VectorStoreProvider::InMemory { dimensions: 1024 }
//!     .create_store()
//!     .await?;
//! store.upsert(&segments).await?;
//! let matches = store.search(&query_embedding, 5, 0.3).await?;
//! ```

use crate::types::{AppError, EmbeddedSegment, Result, SearchMatch};
use crate::utils::toml_config::{IndexConfig, IndexProvider};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ============================================================================
// Vector Store Provider Configuration
// ============================================================================

/// Configuration for vector store providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// Qdrant - requires a running Qdrant server.
    #[cfg(feature = "qdrant")]
    Qdrant {
        /// Qdrant gRPC URL (e.g., "http://localhost:6334").
        url: String,
        /// Optional API key for authentication.
        api_key: Option<String>,
        collection: String,
        dimensions: usize,
    },

    /// Process-local store. Data is lost when the process exits.
    InMemory { dimensions: usize },
}

impl VectorStoreProvider {
    /// Build the provider described by the `[index]` config section.
    pub fn from_config(config: &IndexConfig, api_key: Option<String>) -> Result<Self> {
        match config.provider {
            IndexProvider::Memory => Ok(VectorStoreProvider::InMemory {
                dimensions: config.dimensions,
            }),
            #[cfg(feature = "qdrant")]
            IndexProvider::Qdrant => Ok(VectorStoreProvider::Qdrant {
                url: config.url.clone(),
                api_key,
                collection: config.collection.clone(),
                dimensions: config.dimensions,
            }),
            #[cfg(not(feature = "qdrant"))]
            IndexProvider::Qdrant => {
                let _ = api_key;
                Err(AppError::Configuration(
                    "Qdrant index requires the `qdrant` feature".to_string(),
                ))
            }
        }
    }

    /// Create a vector store instance and make sure its collection exists.
    pub async fn create_store(&self) -> Result<Box<dyn VectorStore>> {
        match self {
            #[cfg(feature = "qdrant")]
            VectorStoreProvider::Qdrant {
                url,
                api_key,
                collection,
                dimensions,
            } => {
                let store = super::qdrant::QdrantVectorStore::new(
                    url,
                    api_key.clone(),
                    collection.clone(),
                    *dimensions,
                )?;
                store.ensure_collection().await?;
                Ok(Box::new(store))
            }

            VectorStoreProvider::InMemory { dimensions } => {
                Ok(Box::new(InMemoryVectorStore::new(*dimensions)))
            }
        }
    }
}

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Abstract trait for vector index operations.
///
/// # Implementors
///
/// - `QdrantVectorStore` - Qdrant server
/// - `InMemoryVectorStore` - single process, testing
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get the name of this vector store provider.
    fn provider_name(&self) -> &'static str;

    /// Vector dimensionality the collection was created with.
    fn dimensions(&self) -> usize;

    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<()>;

    /// Write all segments in one batch. Either every point is stored or the
    /// call fails with `AppError::IndexWrite`.
    async fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<usize>;

    /// Return at most `limit` matches scoring at least `min_score`,
    /// highest score first, ranked from 1.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>>;

    /// Remove every vector belonging to `document_id`. Returns how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Drop all stored vectors, leaving an empty collection behind.
    async fn clear(&self) -> Result<()>;

    /// Number of vectors currently stored.
    async fn count(&self) -> Result<usize>;
}

/// Sort by score descending and assign 1-based ranks.
pub(crate) fn rank_matches(mut matches: Vec<SearchMatch>, limit: usize) -> Vec<SearchMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    for (i, m) in matches.iter_mut().enumerate() {
        m.rank = i + 1;
    }
    matches
}

// ============================================================================
// In-Memory Vector Store
// ============================================================================

/// Vector store kept in process memory, searched by brute-force cosine similarity.
pub struct InMemoryVectorStore {
    dimensions: usize,
    points: RwLock<Vec<EmbeddedSegment>>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            points: RwLock::new(Vec::new()),
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<usize> {
        if let Some(bad) = segments.iter().find(|s| s.vector.len() != self.dimensions) {
            return Err(AppError::IndexWrite(format!(
                "Vector for segment {} has {} dimensions, expected {}",
                bad.metadata.sequence_index,
                bad.vector.len(),
                self.dimensions
            )));
        }

        let mut points = self.points.write();
        for segment in segments {
            match points.iter_mut().find(|p| p.id == segment.id) {
                Some(existing) => *existing = segment.clone(),
                None => points.push(segment.clone()),
            }
        }

        Ok(segments.len())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>> {
        if embedding.len() != self.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Query vector has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let points = self.points.read();
        let matches: Vec<SearchMatch> = points
            .iter()
            .filter_map(|point| {
                let score = Self::cosine_similarity(embedding, &point.vector);
                (score >= min_score).then(|| SearchMatch {
                    metadata: point.metadata.clone(),
                    score,
                    rank: 0,
                })
            })
            .collect();

        Ok(rank_matches(matches, limit))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut points = self.points.write();
        let before = points.len();
        points.retain(|p| p.metadata.document_id != document_id);
        Ok(before - points.len())
    }

    async fn clear(&self) -> Result<()> {
        self.points.write().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.read().len())
    }
}
