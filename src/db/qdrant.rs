use crate::types::{AppError, EmbeddedSegment, Result, SearchMatch, SegmentMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::{
    qdrant::{
        Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
        Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use tracing::{debug, info};

use super::vectorstore::{rank_matches, VectorStore};

/// Qdrant vector store implementation.
///
/// Stores one point per segment in a single cosine-distance collection.
/// Requires a running Qdrant instance.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
}

impl QdrantVectorStore {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: String,
        dimensions: usize,
    ) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to create Qdrant client: {}", e))
        })?;

        Ok(Self {
            client,
            collection,
            dimensions,
        })
    }

    async fn collection_exists(&self) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to list collections: {}", e)))?;

        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection))
    }

    async fn create_collection(&self) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to create collection: {}", e)))?;

        info!(
            collection = %self.collection,
            dimensions = self.dimensions,
            "Created Qdrant collection"
        );
        Ok(())
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches("document_id", document_id.to_string())])
    }
}

fn to_payload(metadata: &SegmentMetadata) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("document_id".to_string(), metadata.document_id.clone().into());
    payload.insert("filename".to_string(), metadata.filename.clone().into());
    payload.insert(
        "sequence_index".to_string(),
        (metadata.sequence_index as i64).into(),
    );
    payload.insert("text".to_string(), metadata.text.clone().into());
    payload.insert(
        "start_offset".to_string(),
        (metadata.start_offset as i64).into(),
    );
    payload.insert("end_offset".to_string(), (metadata.end_offset as i64).into());
    payload.insert(
        "ingested_at".to_string(),
        metadata.ingested_at.to_rfc3339().into(),
    );
    payload
}

fn from_payload(payload: &HashMap<String, Value>) -> Option<SegmentMetadata> {
    let ingested_at = payload
        .get("ingested_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(SegmentMetadata {
        document_id: payload.get("document_id")?.as_str()?.to_string(),
        filename: payload.get("filename")?.as_str()?.to_string(),
        sequence_index: payload.get("sequence_index")?.as_integer()? as usize,
        text: payload.get("text")?.as_str()?.to_string(),
        start_offset: payload
            .get("start_offset")
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as usize,
        end_offset: payload
            .get("end_offset")
            .and_then(|v| v.as_integer())
            .unwrap_or(0) as usize,
        ingested_at,
    })
}

// ============================================================================
// VectorStore Trait Implementation
// ============================================================================

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn provider_name(&self) -> &'static str {
        "qdrant"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.collection_exists().await? {
            self.create_collection().await?;
        }
        Ok(())
    }

    async fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<usize> {
        if segments.is_empty() {
            return Ok(0);
        }

        let points: Vec<PointStruct> = segments
            .iter()
            .map(|segment| {
                PointStruct::new(
                    segment.id.clone(),
                    segment.vector.clone(),
                    to_payload(&segment.metadata),
                )
            })
            .collect();

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| AppError::IndexWrite(format!("Failed to upsert points: {}", e)))?;

        debug!(collection = %self.collection, points = count, "Upserted points");
        Ok(count)
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>> {
        let search_builder =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                .score_threshold(min_score)
                .with_payload(true);

        let search_result = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to search: {}", e)))?;

        let matches = search_result
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let metadata = from_payload(&scored_point.payload)?;
                Some(SearchMatch {
                    metadata,
                    score: scored_point.score,
                    rank: 0,
                })
            })
            .collect();

        Ok(rank_matches(matches, limit))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let filter = Self::document_filter(document_id);

        let count = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter.clone())
                    .exact(true),
            )
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to count points: {}", e)))?
            .result
            .map(|r| r.count as usize)
            .unwrap_or(0);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| AppError::IndexWrite(format!("Failed to delete points: {}", e)))?;

        Ok(count)
    }

    async fn clear(&self) -> Result<()> {
        if self.collection_exists().await? {
            self.client
                .delete_collection(self.collection.as_str())
                .await
                .map_err(|e| {
                    AppError::IndexWrite(format!("Failed to delete collection: {}", e))
                })?;
        }
        self.create_collection().await
    }

    async fn count(&self) -> Result<usize> {
        let info = self
            .client
            .collection_info(self.collection.as_str())
            .await
            .map_err(|e| {
                AppError::IndexUnavailable(format!("Failed to get collection info: {}", e))
            })?;

        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SegmentMetadata {
        SegmentMetadata {
            document_id: "doc-1".to_string(),
            filename: "notes.md".to_string(),
            sequence_index: 3,
            text: "Rust is a systems language.".to_string(),
            start_offset: 120,
            end_offset: 147,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_round_trip() {
        let original = metadata();
        let payload = to_payload(&original);

        let parsed = from_payload(&payload).expect("payload parses");
        assert_eq!(parsed.document_id, original.document_id);
        assert_eq!(parsed.sequence_index, 3);
        assert_eq!(parsed.start_offset, 120);
        assert_eq!(
            parsed.ingested_at.timestamp(),
            original.ingested_at.timestamp()
        );
    }

    #[test]
    fn test_payload_missing_text_is_skipped() {
        let mut payload = to_payload(&metadata());
        payload.remove("text");
        assert!(from_payload(&payload).is_none());
    }

    #[test]
    fn test_client_builds_without_connecting() {
        let store = QdrantVectorStore::new(
            "http://localhost:6334",
            None,
            "knowledge_base".to_string(),
            1024,
        )
        .expect("client builds lazily");
        assert_eq!(store.provider_name(), "qdrant");
        assert_eq!(store.dimensions(), 1024);
    }
}
