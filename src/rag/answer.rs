//! Retrieval-answering engine.
//!
//! One pass per question: embed, search with the loose search-stage
//! threshold, drop matches under the stricter answer-stage threshold, then
//! generate either from the surviving context ("knowledge-grounded") or from
//! the question alone ("direct"). Model calls are never retried here.
//!
//! The non-streaming path splits the model output into reasoning and a final
//! answer with [`parse_model_response`]. The streaming path forwards the raw
//! fragments untouched.

use crate::db::vectorstore::rank_matches;
use crate::db::{ChatLog, VectorStore};
use crate::llm::LLMClient;
use crate::types::{
    AnswerMode, AnswerResult, AppError, ChatRecord, Result, SearchMatch, Source, StreamEvent,
};
use crate::utils::toml_config::{RagConfig, DEFAULT_ANSWER_THRESHOLD, DEFAULT_SEARCH_THRESHOLD};
use async_stream::stream;
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered stream of answer events; ends after `Done` or the first error.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Tuning knobs for the engine, normally taken from `[rag]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerConfig {
    /// Minimum score the index itself applies
    pub search_threshold: f32,
    /// Minimum score a match needs to be used as context
    pub answer_threshold: f32,
    pub default_top_k: usize,
    pub preview_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
            answer_threshold: DEFAULT_ANSWER_THRESHOLD,
            default_top_k: 1,
            preview_chars: 200,
        }
    }
}

impl From<&RagConfig> for AnswerConfig {
    fn from(rag: &RagConfig) -> Self {
        Self {
            search_threshold: rag.search_threshold,
            answer_threshold: rag.answer_threshold,
            default_top_k: rag.top_k,
            preview_chars: rag.preview_chars,
        }
    }
}

/// Model output split into reasoning and the final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub thinking: String,
    pub answer: String,
}

/// Split raw model output on its non-empty lines.
///
/// Assumes the model finishes with a one-line answer after any reasoning:
/// the last non-empty line is the answer and everything before it is
/// thinking. A multi-line final answer will be split wrongly.
pub fn parse_model_response(raw: &str) -> ParsedResponse {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match lines.split_last() {
        None => ParsedResponse {
            thinking: String::new(),
            answer: String::new(),
        },
        Some((last, rest)) => ParsedResponse {
            thinking: rest.join("\n"),
            answer: last.to_string(),
        },
    }
}

/// Outcome of the retrieval half of a request.
#[derive(Debug, Clone)]
struct RetrievalPlan {
    mode: AnswerMode,
    rationale: String,
    context: Vec<SearchMatch>,
}

pub struct AnswerEngine {
    llm: Arc<dyn LLMClient>,
    store: Arc<dyn VectorStore>,
    chat_log: Option<Arc<dyn ChatLog>>,
    config: AnswerConfig,
}

impl AnswerEngine {
    pub fn new(llm: Arc<dyn LLMClient>, store: Arc<dyn VectorStore>, config: AnswerConfig) -> Self {
        Self {
            llm,
            store,
            chat_log: None,
            config,
        }
    }

    /// Record completed answers in `chat_log`.
    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Answer `question` and wait for the full generation.
    ///
    /// `top_k == 0` uses the configured default.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<AnswerResult> {
        let question = validate_question(question)?;
        let plan = self.retrieve(question, top_k).await?;

        let prompt = build_prompt(question, &plan);
        let raw = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        if raw.trim().is_empty() {
            return Err(AppError::Generation(
                "model returned an empty response".to_string(),
            ));
        }

        let parsed = parse_model_response(&raw);
        let thinking = combine_thinking(&plan.rationale, &parsed.thinking);
        let sources = self.sources(&plan.context);

        let result = AnswerResult {
            question: question.to_string(),
            final_answer: parsed.answer,
            thinking,
            sources,
            mode: plan.mode,
            timestamp: Utc::now(),
        };

        if let Some(chat_log) = &self.chat_log {
            record_chat(
                chat_log.as_ref(),
                ChatRecord {
                    question: result.question.clone(),
                    answer: result.final_answer.clone(),
                    mode: result.mode,
                    sources: result.sources.clone(),
                    created_at: result.timestamp,
                },
            )
            .await;
        }

        Ok(result)
    }

    /// Answer `question` as a stream: one `Metadata` event, the raw model
    /// fragments, then `Done`.
    ///
    /// Dropping the stream stops generation; the chat log is only written
    /// once every fragment has been produced.
    pub async fn answer_stream(&self, question: &str, top_k: usize) -> Result<AnswerStream> {
        let question = validate_question(question)?.to_string();
        let plan = self.retrieve(&question, top_k).await?;

        let prompt = build_prompt(&question, &plan);
        let mut fragments = self
            .llm
            .stream(&prompt)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let sources = self.sources(&plan.context);
        let mode = plan.mode;
        let chat_log = self.chat_log.clone();

        let events = stream! {
            yield Ok(StreamEvent::Metadata {
                question: question.clone(),
                sources: sources.clone(),
                mode,
            });

            let mut answer = String::new();
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield Ok(StreamEvent::Fragment { fragment });
                    }
                    Err(e) => {
                        warn!("Answer stream aborted: {}", e);
                        yield Err(AppError::Generation(e.to_string()));
                        return;
                    }
                }
            }

            if answer.trim().is_empty() {
                yield Err(AppError::Generation("model returned an empty response".to_string()));
                return;
            }

            if let Some(chat_log) = &chat_log {
                record_chat(
                    chat_log.as_ref(),
                    ChatRecord {
                        question: question.clone(),
                        answer,
                        mode,
                        sources,
                        created_at: Utc::now(),
                    },
                )
                .await;
            }

            yield Ok(StreamEvent::Done);
        };

        Ok(Box::pin(events))
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Result<RetrievalPlan> {
        let top_k = if top_k == 0 {
            self.config.default_top_k.max(1)
        } else {
            top_k
        };

        let embedding = self
            .llm
            .embed(question)
            .await
            .map_err(|e| AppError::QueryEmbedding(e.to_string()))?;
        let dimensions = self.store.dimensions();
        if embedding.len() != dimensions {
            return Err(AppError::QueryEmbedding(format!(
                "question embedding has {} dimensions, the index expects {}",
                embedding.len(),
                dimensions
            )));
        }

        // context assembly relies on descending score order
        let matches = rank_matches(
            self.store
                .search(&embedding, top_k, self.config.search_threshold)
                .await?,
            top_k,
        );
        let candidates = matches.len();

        let best = matches.first().map(|m| m.score);
        let context: Vec<SearchMatch> = matches
            .into_iter()
            .filter(|m| m.score >= self.config.answer_threshold)
            .collect();

        debug!(
            candidates,
            relevant = context.len(),
            answer_threshold = self.config.answer_threshold,
            "Retrieval finished"
        );

        let plan = match (candidates, best) {
            (0, _) | (_, None) => RetrievalPlan {
                mode: AnswerMode::Direct,
                rationale: format!(
                    "No segment in the knowledge base matched the question above the search \
                     threshold {:.2}; answering from the model's general knowledge.",
                    self.config.search_threshold
                ),
                context,
            },
            (n, Some(best)) if context.is_empty() => RetrievalPlan {
                mode: AnswerMode::Direct,
                rationale: format!(
                    "Found {} candidate segment(s), but the best similarity {:.3} is below the \
                     answer threshold {:.2}; answering from the model's general knowledge.",
                    n, best, self.config.answer_threshold
                ),
                context,
            },
            _ => {
                let max = context.first().map(|m| m.score).unwrap_or_default();
                let min = context.last().map(|m| m.score).unwrap_or_default();
                RetrievalPlan {
                    mode: AnswerMode::KnowledgeGrounded,
                    rationale: format!(
                        "Found {} relevant segment(s) in the knowledge base with similarity \
                         {:.3} to {:.3}; answering from their content.",
                        context.len(),
                        min,
                        max
                    ),
                    context,
                }
            }
        };

        info!(mode = %plan.mode, segments = plan.context.len(), "Answer mode selected");
        Ok(plan)
    }

    fn sources(&self, context: &[SearchMatch]) -> Vec<Source> {
        context
            .iter()
            .map(|m| Source {
                filename: m.metadata.filename.clone(),
                sequence_index: m.metadata.sequence_index,
                score: round_score(m.score),
                text_preview: preview(&m.metadata.text, self.config.preview_chars),
            })
            .collect()
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidInput("question must not be empty".to_string()));
    }
    Ok(question)
}

/// Context block: segment texts in descending score order, blank-line separated.
pub fn assemble_context(matches: &[SearchMatch]) -> String {
    matches
        .iter()
        .map(|m| m.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(question: &str, plan: &RetrievalPlan) -> String {
    match plan.mode {
        AnswerMode::KnowledgeGrounded => format!(
            "You are a knowledge-base assistant. Answer the question using the context below.\n\
             If the context does not contain enough information to answer, say so plainly \
             instead of guessing.\n\
             You may reason step by step first; put your final answer on the last line.\n\n\
             Context:\n{}\n\n\
             Question: {}\n\n\
             Answer:",
            assemble_context(&plan.context),
            question
        ),
        AnswerMode::Direct => format!(
            "Answer the question below.\n\
             You may reason step by step first; put your final answer on the last line.\n\n\
             Question: {}\n\n\
             Answer:",
            question
        ),
    }
}

fn combine_thinking(rationale: &str, model_thinking: &str) -> String {
    if model_thinking.is_empty() {
        rationale.to_string()
    } else {
        format!("{}\n\nModel reasoning:\n{}", rationale, model_thinking)
    }
}

fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

async fn record_chat(chat_log: &dyn ChatLog, record: ChatRecord) {
    if let Err(e) = chat_log.append_chat(&record).await {
        warn!("Failed to append chat record: {}", e);
    }
}
