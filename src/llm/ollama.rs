use crate::llm::client::LLMClient;
use crate::types::{AppError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use ollama_rs::{
    Ollama,
    generation::{
        chat::{ChatMessage, request::ChatMessageRequest},
        embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest},
    },
};
use std::time::Duration;

const DEFAULT_OLLAMA_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    chat_model: String,
    embedding_model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        chat_model: String,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self> {
        let (host, port) = split_base_url(base_url)?;
        let client = Ollama::new(host, port);

        Ok(Self {
            client,
            chat_model,
            embedding_model,
            timeout,
        })
    }

    fn chat_request(&self, prompt: &str) -> ChatMessageRequest {
        ChatMessageRequest::new(
            self.chat_model.clone(),
            vec![ChatMessage::user(prompt.to_string())],
        )
    }
}

/// Split `http://host:port` into the `(scheme://host, port)` pair `Ollama::new` expects.
fn split_base_url(base_url: &str) -> Result<(String, u16)> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| AppError::Configuration(format!("Invalid Ollama URL '{}': {}", base_url, e)))?;
    let host = url.host_str().ok_or_else(|| {
        AppError::Configuration(format!("Ollama URL '{}' has no host", base_url))
    })?;
    let port = url.port().unwrap_or(DEFAULT_OLLAMA_PORT);
    Ok((format!("{}://{}", url.scheme(), host), port))
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );

        let response = tokio::time::timeout(self.timeout, self.client.generate_embeddings(request))
            .await
            .map_err(|_| AppError::LLM("Ollama embedding timed out".to_string()))?
            .map_err(|e| AppError::LLM(format!("Ollama embedding error: {}", e)))?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::LLM("Ollama returned no embedding".to_string()))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.chat_request(prompt);

        let response = tokio::time::timeout(self.timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| AppError::LLM("Ollama generation timed out".to_string()))?
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        let content = response.message.content;
        if content.trim().is_empty() {
            return Err(AppError::LLM("Ollama returned an empty response".to_string()));
        }
        Ok(content)
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn Stream<Item = Result<String>> + Send + Unpin>> {
        let request = self.chat_request(prompt);
        let timeout = self.timeout;

        let mut stream_response =
            tokio::time::timeout(timeout, self.client.send_chat_messages_stream(request))
                .await
                .map_err(|_| AppError::LLM("Ollama stream timed out".to_string()))?
                .map_err(|e| AppError::LLM(format!("Ollama stream error: {}", e)))?;

        let output_stream = stream! {
            loop {
                let next = match tokio::time::timeout(timeout, stream_response.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(AppError::LLM("Ollama stream stalled".to_string()));
                        break;
                    }
                };
                match next {
                    Some(Ok(chunk)) => {
                        let content = chunk.message.content;
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Some(Err(_)) => {
                        yield Err(AppError::LLM("Stream chunk error".to_string()));
                        break;
                    }
                    None => break,
                }
            }
        };

        Ok(Box::new(Box::pin(output_stream)))
    }

    async fn check_connection(&self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.client.list_local_models()).await,
            Ok(Ok(_))
        )
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }

    fn embedding_model_name(&self) -> &str {
        &self.embedding_model
    }
}
