//! LLM client abstractions and provider selection
//!
//! - **Ollama**: embeddings, completions and streamed completions
//! - **Unavailable**: deterministic failure for every call, so callers never
//!   need a special "no model" branch

use crate::types::{AppError, Result};
use crate::utils::toml_config::OllamaConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Gateway to the embedding and generation service.
///
/// Implementations must bound every call; a call resolves to a value or an
/// error, never hangs.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Produce a fixed-length embedding for `text`
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate a complete answer for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Stream a completion as ordered text fragments
    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>>;

    /// Whether the backing service is reachable
    async fn check_connection(&self) -> bool;

    /// Chat model identifier
    fn model_name(&self) -> &str;

    /// Embedding model identifier
    fn embedding_model_name(&self) -> &str;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// Ollama server providing both chat and embedding models
    Ollama {
        base_url: String,
        chat_model: String,
        embedding_model: String,
        timeout: Duration,
    },

    /// No usable model service; every call fails with `reason`
    Unavailable {
        reason: String,
        chat_model: String,
        embedding_model: String,
    },
}

impl Provider {
    /// Pick the provider described by the `[ollama]` config section.
    pub fn from_config(config: &OllamaConfig) -> Self {
        if cfg!(feature = "ollama") {
            Provider::Ollama {
                base_url: config.base_url.clone(),
                chat_model: config.chat_model.clone(),
                embedding_model: config.embedding_model.clone(),
                timeout: Duration::from_secs(config.request_timeout_secs),
            }
        } else {
            Provider::Unavailable {
                reason: "built without the `ollama` feature".to_string(),
                chat_model: config.chat_model.clone(),
                embedding_model: config.embedding_model.clone(),
            }
        }
    }

    /// Create a client instance for this provider
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "ollama")]
            Provider::Ollama {
                base_url,
                chat_model,
                embedding_model,
                timeout,
            } => Ok(Box::new(super::ollama::OllamaClient::new(
                base_url,
                chat_model.clone(),
                embedding_model.clone(),
                *timeout,
            )?)),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama provider requires the `ollama` feature".to_string(),
            )),

            Provider::Unavailable {
                reason,
                chat_model,
                embedding_model,
            } => Ok(Box::new(UnavailableClient::new(
                reason.clone(),
                chat_model.clone(),
                embedding_model.clone(),
            ))),
        }
    }

    /// Create the configured client, falling back to [`UnavailableClient`]
    /// when construction fails so the server can still start degraded.
    pub async fn create_client_or_unavailable(&self) -> Box<dyn LLMClient> {
        match self.create_client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(provider = self.name(), "Model gateway unavailable: {}", e);
                let (chat_model, embedding_model) = self.model_names();
                Box::new(UnavailableClient::new(
                    e.to_string(),
                    chat_model.to_string(),
                    embedding_model.to_string(),
                ))
            }
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Ollama { .. } => "Ollama",
            Provider::Unavailable { .. } => "Unavailable",
        }
    }

    fn model_names(&self) -> (&str, &str) {
        match self {
            Provider::Ollama {
                chat_model,
                embedding_model,
                ..
            }
            | Provider::Unavailable {
                chat_model,
                embedding_model,
                ..
            } => (chat_model, embedding_model),
        }
    }
}

/// Fail-safe client used when no model service can be reached.
#[derive(Debug, Clone)]
pub struct UnavailableClient {
    reason: String,
    chat_model: String,
    embedding_model: String,
}

impl UnavailableClient {
    pub fn new(reason: String, chat_model: String, embedding_model: String) -> Self {
        Self {
            reason,
            chat_model,
            embedding_model,
        }
    }

    fn error(&self) -> AppError {
        AppError::LLM(format!("Model service unavailable: {}", self.reason))
    }
}

#[async_trait]
impl LLMClient for UnavailableClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(self.error())
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(self.error())
    }

    async fn stream(
        &self,
        _prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        Err(self.error())
    }

    async fn check_connection(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }

    fn embedding_model_name(&self) -> &str {
        &self.embedding_model
    }
}
