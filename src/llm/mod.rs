//! Model gateway: embeddings and text generation
//!
//! The rest of the crate talks to language models only through the
//! [`LLMClient`] trait, so the live Ollama client and the fail-safe
//! [`UnavailableClient`] are interchangeable.
//!
//! # Supported Providers
//!
//! - `ollama` (feature, default) - local Ollama server for chat and embeddings
//! - `Unavailable` - always reports failure; used when no live client can be built
//!
//! # Streaming
//!
//! [`LLMClient::stream`] yields text fragments in order and ends when the
//! service signals completion.

/// Core LLM client trait, provider selection and the fail-safe stub.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use client::{LLMClient, Provider, UnavailableClient};
