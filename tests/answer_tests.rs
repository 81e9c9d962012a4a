//! Retrieval-answering tests: mode selection, thresholds, parsing and
//! streaming, against mocked models and an in-memory index.

mod common;

use common::mocks::{
    vector_with_similarity, FixedScoreStore, FlakyVectorStore, MockLLMClient, RecordingChatLog,
};
use futures::StreamExt;
use kbase::db::{CatalogDb, ChatLog, InMemoryVectorStore, VectorStore};
use kbase::rag::{AnswerConfig, AnswerEngine, AnswerStream};
use kbase::types::{AnswerMode, AppError, StreamEvent};
use kbase::utils::toml_config::{DEFAULT_ANSWER_THRESHOLD, DEFAULT_SEARCH_THRESHOLD};
use kbase::{KbConfig, KnowledgeBase};
use std::sync::Arc;
use tempfile::TempDir;

const DOC: &str = "Rust achieves memory safety through ownership and borrowing.";

/// Model that maps the stored document onto the first axis and the
/// question "How close is X?" onto a vector with the given similarity.
fn scripted_llm(similarity: f32) -> MockLLMClient {
    MockLLMClient::new(3)
        .with_embedding("ownership", vec![1.0, 0.0, 0.0])
        .with_embedding("How close", vector_with_similarity(3, similarity))
}

async fn knowledge_base(llm: MockLLMClient) -> (KnowledgeBase, Arc<CatalogDb>, TempDir) {
    let uploads = TempDir::new().unwrap();
    let mut config = KbConfig::default();
    config.rag.upload_dir = uploads.path().to_string_lossy().to_string();

    let catalog = Arc::new(CatalogDb::in_memory().await.unwrap());
    let kb = KnowledgeBase::new(
        &config,
        Arc::new(llm),
        Arc::new(InMemoryVectorStore::new(3)),
        Arc::clone(&catalog),
    )
    .unwrap();
    (kb, catalog, uploads)
}

async fn seeded_store(llm: &MockLLMClient) -> Arc<dyn VectorStore> {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new(3));
    let catalog = Arc::new(CatalogDb::in_memory().await.unwrap());
    let pipeline = kbase::IngestionPipeline::new(
        kbase::TextChunker::new(512, 50).unwrap(),
        Arc::new(llm.clone()),
        Arc::clone(&store),
        catalog,
    );
    pipeline.ingest(DOC, "rust.txt").await.unwrap();
    store
}

async fn collect(mut stream: AnswerStream) -> Vec<Result<StreamEvent, AppError>> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_strong_match_grounds_the_answer() {
    let llm = scripted_llm(0.9).with_response("The context mentions ownership.\nOwnership and borrowing.");
    let prompts = Arc::clone(&llm.prompts);
    let (kb, catalog, _uploads) = knowledge_base(llm).await;
    kb.ingest(DOC, "rust.txt").await.unwrap();

    let result = kb.answer("How close is memory safety?", 1).await.unwrap();

    assert_eq!(result.mode, AnswerMode::KnowledgeGrounded);
    assert_eq!(result.final_answer, "Ownership and borrowing.");
    assert!(result.thinking.contains("1 relevant segment"));
    assert!(result.thinking.contains("The context mentions ownership."));
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].filename, "rust.txt");
    assert!((result.sources[0].score - 0.9).abs() < 1e-3);
    assert_eq!(result.sources[0].text_preview, DOC);

    let prompt = prompts.lock().last().cloned().unwrap();
    assert!(prompt.contains(DOC));
    assert!(prompt.contains("does not contain enough information"));

    assert_eq!(catalog.stats().await.unwrap().total_chats, 1);
}

#[tokio::test]
async fn test_weak_match_is_excluded_and_answered_directly() {
    // 0.4 passes the search threshold but not the answer threshold
    let llm = scripted_llm(0.4).with_response("Paris");
    let prompts = Arc::clone(&llm.prompts);
    let (kb, _catalog, _uploads) = knowledge_base(llm).await;
    kb.ingest(DOC, "rust.txt").await.unwrap();

    let result = kb.answer("How close is the capital of France?", 1).await.unwrap();

    assert_eq!(result.mode, AnswerMode::Direct);
    assert!(result.sources.is_empty());
    assert!(result.thinking.contains("below the answer threshold"));
    assert_eq!(result.final_answer, "Paris");

    let prompt = prompts.lock().last().cloned().unwrap();
    assert!(!prompt.contains(DOC));
}

#[tokio::test]
async fn test_empty_knowledge_base_answers_directly() {
    let (kb, _catalog, _uploads) = knowledge_base(scripted_llm(0.9)).await;

    let result = kb.answer("How close is anything?", 3).await.unwrap();

    assert_eq!(result.mode, AnswerMode::Direct);
    assert!(result.sources.is_empty());
    assert!(result.thinking.starts_with("No segment"));
}

#[tokio::test]
async fn test_clear_then_ask_is_direct() {
    let (kb, _catalog, _uploads) = knowledge_base(scripted_llm(0.9)).await;
    kb.ingest(DOC, "rust.txt").await.unwrap();
    assert_eq!(
        kb.answer("How close is it?", 1).await.unwrap().mode,
        AnswerMode::KnowledgeGrounded
    );

    kb.clear_all().await.unwrap();

    let result = kb.answer("How close is it?", 1).await.unwrap();
    assert_eq!(result.mode, AnswerMode::Direct);
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn test_top_k_limits_sources_in_score_order() {
    let llm = MockLLMClient::new(3)
        .with_embedding("first", vector_with_similarity(3, 0.95))
        .with_embedding("second", vector_with_similarity(3, 0.8))
        .with_embedding("third", vector_with_similarity(3, 0.6))
        .with_embedding("Question", vec![1.0, 0.0, 0.0]);
    let (kb, _catalog, _uploads) = knowledge_base(llm).await;
    for (text, name) in [
        ("The third note.", "c.txt"),
        ("The first note.", "a.txt"),
        ("The second note.", "b.txt"),
    ] {
        kb.ingest(text, name).await.unwrap();
    }

    let result = kb.answer("Question?", 2).await.unwrap();

    let names: Vec<&str> = result.sources.iter().map(|s| s.filename.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert!(result.sources[0].score >= result.sources[1].score);
}

#[tokio::test]
async fn test_zero_top_k_uses_configured_default() {
    let llm = MockLLMClient::new(3)
        .with_embedding("note", vec![1.0, 0.0, 0.0])
        .with_embedding("Question", vec![1.0, 0.0, 0.0]);
    let (kb, _catalog, _uploads) = knowledge_base(llm).await;
    kb.ingest("One note.", "a.txt").await.unwrap();
    kb.ingest("Another note.", "b.txt").await.unwrap();

    let result = kb.answer("Question?", 0).await.unwrap();

    assert_eq!(result.sources.len(), 1);
}

#[tokio::test]
async fn test_long_segments_get_truncated_previews() {
    let long = format!("ownership {}", "x".repeat(300));
    let (kb, _catalog, _uploads) = knowledge_base(scripted_llm(0.9)).await;
    kb.ingest(&long, "long.txt").await.unwrap();

    let result = kb.answer("How close is it?", 1).await.unwrap();

    let preview = &result.sources[0].text_preview;
    assert!(preview.ends_with("..."));
    assert_eq!(preview.chars().count(), 203);
}

#[tokio::test]
async fn test_failures_map_to_their_errors() {
    let (kb, _catalog, _uploads) = knowledge_base(scripted_llm(0.9)).await;
    assert!(matches!(
        kb.answer("   ", 1).await,
        Err(AppError::InvalidInput(_))
    ));

    let broken_embed = scripted_llm(0.9).failing_embed_for("How close");
    let (kb, _catalog, _uploads) = knowledge_base(broken_embed).await;
    assert!(matches!(
        kb.answer("How close is it?", 1).await,
        Err(AppError::QueryEmbedding(_))
    ));

    let broken_generate = scripted_llm(0.9).failing_generate();
    let (kb, catalog, _uploads) = knowledge_base(broken_generate).await;
    assert!(matches!(
        kb.answer("How close is it?", 1).await,
        Err(AppError::Generation(_))
    ));
    assert_eq!(catalog.stats().await.unwrap().total_chats, 0);

    let mut offline = FlakyVectorStore::new(3);
    offline.fail_search = true;
    let engine = AnswerEngine::new(
        Arc::new(scripted_llm(0.9)),
        Arc::new(offline),
        AnswerConfig::default(),
    );
    assert!(matches!(
        engine.answer("How close is it?", 1).await,
        Err(AppError::IndexUnavailable(_))
    ));
}

#[tokio::test]
async fn test_blank_model_output_is_a_generation_error() {
    let (kb, _catalog, _uploads) = knowledge_base(scripted_llm(0.9).with_response(" \n ")).await;

    assert!(matches!(
        kb.answer("How close is it?", 1).await,
        Err(AppError::Generation(_))
    ));
}

#[tokio::test]
async fn test_question_embedding_must_match_index_dimensions() {
    let llm = scripted_llm(0.9).with_embedding("Question", vec![1.0, 0.0]);
    let (kb, catalog, _uploads) = knowledge_base(llm.clone()).await;
    kb.ingest(DOC, "rust.txt").await.unwrap();

    assert!(matches!(
        kb.answer("Question about it?", 1).await,
        Err(AppError::QueryEmbedding(_))
    ));
    assert!(matches!(
        kb.answer_stream("Question about it?", 1).await,
        Err(AppError::QueryEmbedding(_))
    ));
    assert!(llm.last_prompt().is_none());
    assert_eq!(catalog.stats().await.unwrap().total_chats, 0);
}

// ============= Threshold Boundaries =============

fn fixed_score_engine(llm: &MockLLMClient, scores: &[f32]) -> AnswerEngine {
    AnswerEngine::new(
        Arc::new(llm.clone()),
        Arc::new(FixedScoreStore::new(3, scores)),
        AnswerConfig::default(),
    )
}

#[tokio::test]
async fn test_score_at_answer_threshold_is_used_as_context() {
    let llm = MockLLMClient::new(3);
    let just_below = DEFAULT_ANSWER_THRESHOLD - 1e-4;
    let engine = fixed_score_engine(
        &llm,
        &[DEFAULT_ANSWER_THRESHOLD, just_below, DEFAULT_SEARCH_THRESHOLD],
    );

    let result = engine.answer("What is stored?", 3).await.unwrap();

    assert_eq!(result.mode, AnswerMode::KnowledgeGrounded);
    assert!(result.thinking.contains("Found 1 relevant segment"));
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].sequence_index, 0);
    assert_eq!(result.sources[0].score, DEFAULT_ANSWER_THRESHOLD);

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.contains("Segment number 0."));
    assert!(!prompt.contains("Segment number 1."));
    assert!(!prompt.contains("Segment number 2."));
}

#[tokio::test]
async fn test_scores_below_answer_threshold_answer_directly() {
    let llm = MockLLMClient::new(3);
    let engine = fixed_score_engine(
        &llm,
        &[DEFAULT_ANSWER_THRESHOLD - 1e-4, DEFAULT_SEARCH_THRESHOLD],
    );

    let result = engine.answer("What is stored?", 3).await.unwrap();

    assert_eq!(result.mode, AnswerMode::Direct);
    assert!(result.thinking.contains("Found 2 candidate segment(s)"));
    assert!(result.thinking.contains("below the answer threshold"));
    assert!(result.sources.is_empty());
    assert!(!llm.last_prompt().unwrap().contains("Segment number"));
}

#[tokio::test]
async fn test_unsorted_index_results_are_ranked_by_score() {
    let llm = MockLLMClient::new(3);
    let engine = fixed_score_engine(&llm, &[0.6, 0.9, 0.75]);

    let result = engine.answer("What is stored?", 3).await.unwrap();

    assert_eq!(result.mode, AnswerMode::KnowledgeGrounded);
    let order: Vec<usize> = result.sources.iter().map(|s| s.sequence_index).collect();
    assert_eq!(order, vec![1, 2, 0]);
    assert!(result.thinking.contains("0.600 to 0.900"));

    let prompt = llm.last_prompt().unwrap();
    let position = |text: &str| prompt.find(text).unwrap();
    assert!(position("Segment number 1.") < position("Segment number 2."));
    assert!(position("Segment number 2.") < position("Segment number 0."));
}

// ============= Streaming =============

#[tokio::test]
async fn test_stream_concatenates_to_generated_answer() {
    let response = "Looking at the context.\nOwnership rules.\nOwnership and borrowing.";
    let llm = scripted_llm(0.9).with_response(response);
    let store = seeded_store(&llm).await;
    let chat_log = Arc::new(RecordingChatLog::default());
    let engine = AnswerEngine::new(Arc::new(llm.clone()), store, AnswerConfig::default())
        .with_chat_log(Arc::clone(&chat_log) as Arc<dyn ChatLog>);

    let events = collect(engine.answer_stream("How close is it?", 1).await.unwrap()).await;
    let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();

    match &events[0] {
        StreamEvent::Metadata {
            question,
            sources,
            mode,
        } => {
            assert_eq!(question, "How close is it?");
            assert_eq!(*mode, AnswerMode::KnowledgeGrounded);
            assert_eq!(sources.len(), 1);
        }
        other => panic!("expected metadata first, got {:?}", other),
    }
    assert_eq!(events.last(), Some(&StreamEvent::Done));

    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Fragment { fragment } => Some(fragment.as_str()),
            _ => None,
        })
        .collect();
    let generated = engine.answer("How close is it?", 1).await.unwrap();

    assert_eq!(streamed, response);
    assert_eq!(
        kbase::rag::parse_model_response(&streamed).answer,
        generated.final_answer
    );

    let records = chat_log.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].answer, response);
    assert_eq!(records[0].mode, AnswerMode::KnowledgeGrounded);
}

#[tokio::test]
async fn test_stream_direct_mode_has_no_sources() {
    let llm = scripted_llm(0.4).with_fragments(&["Par", "is"]);
    let store = seeded_store(&llm).await;
    let engine = AnswerEngine::new(Arc::new(llm.clone()), store, AnswerConfig::default());

    let events = collect(engine.answer_stream("How close is it?", 1).await.unwrap()).await;

    assert_eq!(
        events[0].as_ref().unwrap(),
        &StreamEvent::Metadata {
            question: "How close is it?".to_string(),
            sources: vec![],
            mode: AnswerMode::Direct,
        }
    );
    assert!(!llm.last_prompt().unwrap().contains(DOC));
}

#[tokio::test]
async fn test_interrupted_stream_writes_no_chat_entry() {
    let llm = scripted_llm(0.9)
        .with_fragments(&["Own", "ership", " and borrowing"])
        .failing_stream_after(2);
    let store = seeded_store(&llm).await;
    let chat_log = Arc::new(RecordingChatLog::default());
    let engine = AnswerEngine::new(Arc::new(llm), store, AnswerConfig::default())
        .with_chat_log(Arc::clone(&chat_log) as Arc<dyn ChatLog>);

    let events = collect(engine.answer_stream("How close is it?", 1).await.unwrap()).await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[1], Ok(StreamEvent::Fragment { .. })));
    assert!(matches!(events[2], Ok(StreamEvent::Fragment { .. })));
    assert!(matches!(events[3], Err(AppError::Generation(_))));
    assert!(chat_log.records().is_empty());
}

#[tokio::test]
async fn test_dropped_stream_writes_no_chat_entry() {
    let llm = scripted_llm(0.9).with_fragments(&["One", " two", " three"]);
    let store = seeded_store(&llm).await;
    let chat_log = Arc::new(RecordingChatLog::default());
    let engine = AnswerEngine::new(Arc::new(llm), store, AnswerConfig::default())
        .with_chat_log(Arc::clone(&chat_log) as Arc<dyn ChatLog>);

    let mut stream = engine.answer_stream("How close is it?", 1).await.unwrap();
    assert!(matches!(
        stream.next().await,
        Some(Ok(StreamEvent::Metadata { .. }))
    ));
    assert!(matches!(
        stream.next().await,
        Some(Ok(StreamEvent::Fragment { .. }))
    ));
    drop(stream);

    assert!(chat_log.records().is_empty());
}

#[tokio::test]
async fn test_stream_setup_errors_are_returned_before_streaming() {
    let llm = scripted_llm(0.9).failing_generate();
    let store = seeded_store(&llm).await;
    let engine = AnswerEngine::new(Arc::new(llm), store, AnswerConfig::default());

    assert!(matches!(
        engine.answer_stream("How close is it?", 1).await,
        Err(AppError::Generation(_))
    ));
    assert!(matches!(
        engine.answer_stream("", 1).await,
        Err(AppError::InvalidInput(_))
    ));
}
