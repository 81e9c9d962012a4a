use crate::{
    types::{AnswerResult, ChatRequest, Result, StreamEvent},
    AppState,
};
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;

/// Ask a question about the knowledge base
///
/// With `stream: true` the answer arrives as Server-Sent Events: one metadata
/// event, then `{chunk}` events, then `{done: true}`. A generation failure
/// after the stream has started is sent as an `{error}` event.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer, or an event stream when `stream` is set", body = AnswerResult),
        (status = 400, description = "Empty question"),
        (status = 502, description = "Question embedding or generation failed"),
        (status = 503, description = "Vector index unavailable")
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response> {
    let top_k = payload
        .top_k
        .unwrap_or_else(|| state.config_manager.config().rag.top_k);

    if !payload.stream {
        let result = state.kb.answer(&payload.question, top_k).await?;
        return Ok(Json(result).into_response());
    }

    let events = state
        .kb
        .answer_stream(&payload.question, top_k)
        .await?
        .map(|item| {
            Ok::<_, Infallible>(Event::default().data(stream_payload(item).to_string()))
        });

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// JSON carried in the `data:` line of each event.
fn event_payload(event: &StreamEvent) -> Value {
    match event {
        StreamEvent::Metadata {
            question,
            sources,
            mode,
        } => json!({
            "metadata": true,
            "question": question,
            "sources": sources,
            "mode": mode,
        }),
        StreamEvent::Fragment { fragment } => json!({ "chunk": fragment }),
        StreamEvent::Done => json!({ "done": true }),
    }
}

/// A failed item becomes an `{error}` event; the stream ends after it.
fn stream_payload(item: Result<StreamEvent>) -> Value {
    match item {
        Ok(event) => event_payload(&event),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnswerMode, AppError, Source};

    #[test]
    fn test_metadata_payload_shape() {
        let payload = event_payload(&StreamEvent::Metadata {
            question: "q".to_string(),
            sources: vec![Source {
                filename: "a.txt".to_string(),
                sequence_index: 0,
                score: 0.9,
                text_preview: "preview".to_string(),
            }],
            mode: AnswerMode::KnowledgeGrounded,
        });

        assert_eq!(payload["metadata"], true);
        assert_eq!(payload["question"], "q");
        assert_eq!(payload["mode"], "knowledge-grounded");
        assert_eq!(payload["sources"][0]["filename"], "a.txt");
    }

    #[test]
    fn test_fragment_done_and_failure_payloads() {
        assert_eq!(
            event_payload(&StreamEvent::Fragment {
                fragment: "Hel".to_string()
            }),
            json!({ "chunk": "Hel" })
        );
        assert_eq!(event_payload(&StreamEvent::Done), json!({ "done": true }));
        assert_eq!(
            stream_payload(Err(AppError::Generation("boom".to_string()))),
            json!({ "error": "Answer generation failed: boom" })
        );
    }
}
