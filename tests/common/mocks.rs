//! Mock implementations for testing.
//!
//! Shared by the integration test files so none of them needs a running
//! model server or vector database.

use async_trait::async_trait;
use futures::stream;
use kbase::db::{ChatLog, InMemoryVectorStore, VectorStore};
use kbase::llm::LLMClient;
use chrono::Utc;
use kbase::types::{AppError, ChatRecord, EmbeddedSegment, Result, SearchMatch, SegmentMetadata};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock model gateway with scripted embeddings and answers.
///
/// Texts are embedded by the first rule whose key they contain; anything
/// else gets [`MockLLMClient::fallback_vector`], which is orthogonal to the
/// first axis.
///
/// # Examples
///
/// ```ignore
/// let llm = MockLLMClient::new(3)
///     .with_embedding("Rust", vec![1.0, 0.0, 0.0])
///     .failing_embed_for("broken")
///     .with_response("Reasoning\nFinal answer");
/// ```
#[derive(Clone)]
pub struct MockLLMClient {
    dimensions: usize,
    embeddings: Vec<(String, Vec<f32>)>,
    embed_failures: Vec<String>,
    response: String,
    fragments: Vec<String>,
    stream_error_after: Option<usize>,
    generate_fails: bool,
    pub embed_calls: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLLMClient {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            embeddings: Vec::new(),
            embed_failures: Vec::new(),
            response: "Mock answer".to_string(),
            fragments: vec!["Mock".to_string(), " answer".to_string()],
            stream_error_after: None,
            generate_fails: false,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Texts containing `key` embed to `vector`.
    pub fn with_embedding(mut self, key: &str, vector: Vec<f32>) -> Self {
        self.embeddings.push((key.to_string(), vector));
        self
    }

    /// Embedding fails for texts containing `key`.
    pub fn failing_embed_for(mut self, key: &str) -> Self {
        self.embed_failures.push(key.to_string());
        self
    }

    /// `generate` returns `response`; `stream` yields it line by line.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self.fragments = split_fragments(response);
        self
    }

    pub fn with_fragments(mut self, fragments: &[&str]) -> Self {
        self.fragments = fragments.iter().map(|f| f.to_string()).collect();
        self
    }

    /// The stream fails after yielding `count` fragments.
    pub fn failing_stream_after(mut self, count: usize) -> Self {
        self.stream_error_after = Some(count);
        self
    }

    pub fn failing_generate(mut self) -> Self {
        self.generate_fails = true;
        self
    }

    pub fn fallback_vector(&self) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        if let Some(last) = vector.last_mut() {
            *last = 1.0;
        }
        vector
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

/// Split text after each newline so the fragments concatenate back to it.
fn split_fragments(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);

        if self.embed_failures.iter().any(|key| text.contains(key)) {
            return Err(AppError::LLM("Mock embedding failure".to_string()));
        }

        Ok(self
            .embeddings
            .iter()
            .find(|(key, _)| text.contains(key))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.fallback_vector()))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if self.generate_fails {
            return Err(AppError::LLM("Mock generation failure".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        self.prompts.lock().push(prompt.to_string());
        if self.generate_fails {
            return Err(AppError::LLM("Mock generation failure".to_string()));
        }

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(after) = self.stream_error_after {
            items.truncate(after);
            items.push(Err(AppError::LLM("Mock stream interrupted".to_string())));
        }
        Ok(Box::new(stream::iter(items)))
    }

    async fn check_connection(&self) -> bool {
        !self.generate_fails
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }

    fn embedding_model_name(&self) -> &str {
        "mock-embed"
    }
}

/// In-memory store that can be told to fail individual operations.
pub struct FlakyVectorStore {
    inner: InMemoryVectorStore,
    pub fail_upsert: bool,
    pub fail_search: bool,
    pub fail_clear: bool,
}

impl FlakyVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: InMemoryVectorStore::new(dimensions),
            fail_upsert: false,
            fail_search: false,
            fail_clear: false,
        }
    }
}

#[async_trait]
impl VectorStore for FlakyVectorStore {
    fn provider_name(&self) -> &'static str {
        "flaky"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.inner.ensure_collection().await
    }

    async fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<usize> {
        if self.fail_upsert {
            return Err(AppError::IndexWrite("Mock index rejected write".to_string()));
        }
        self.inner.upsert(segments).await
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>> {
        if self.fail_search {
            return Err(AppError::IndexUnavailable("Mock index offline".to_string()));
        }
        self.inner.search(embedding, limit, min_score).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.inner.delete_document(document_id).await
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_clear {
            return Err(AppError::IndexUnavailable("Mock index offline".to_string()));
        }
        self.inner.clear().await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// Index that answers every search with the same scored segments, in the
/// order given and without sorting them.
///
/// Segment `i` reads `"Segment number {i}."` and comes from `fixed.txt`.
pub struct FixedScoreStore {
    dimensions: usize,
    matches: Vec<SearchMatch>,
}

impl FixedScoreStore {
    pub fn new(dimensions: usize, scores: &[f32]) -> Self {
        let matches = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                let text = format!("Segment number {}.", i);
                SearchMatch {
                    metadata: SegmentMetadata {
                        document_id: "fixed".to_string(),
                        filename: "fixed.txt".to_string(),
                        sequence_index: i,
                        start_offset: 0,
                        end_offset: text.len(),
                        text,
                        ingested_at: Utc::now(),
                    },
                    score,
                    rank: 0,
                }
            })
            .collect();
        Self {
            dimensions,
            matches,
        }
    }
}

#[async_trait]
impl VectorStore for FixedScoreStore {
    fn provider_name(&self) -> &'static str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<usize> {
        Ok(segments.len())
    }

    async fn search(
        &self,
        _embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>> {
        Ok(self
            .matches
            .iter()
            .filter(|m| m.score >= min_score)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_document(&self, _document_id: &str) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.matches.len())
    }
}

/// Chat log that keeps records in memory.
#[derive(Default)]
pub struct RecordingChatLog {
    records: Mutex<Vec<ChatRecord>>,
}

impl RecordingChatLog {
    pub fn records(&self) -> Vec<ChatRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ChatLog for RecordingChatLog {
    async fn append_chat(&self, record: &ChatRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Unit vector in `dimensions` with cosine `similarity` to the first axis.
pub fn vector_with_similarity(dimensions: usize, similarity: f32) -> Vec<f32> {
    let mut vector = vec![0.0; dimensions];
    vector[0] = similarity;
    vector[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
    vector
}
