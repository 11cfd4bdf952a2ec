//! LLM provider interface — the only contract the core requires of a language model.
//!
//! `complete` and `stream` are required; `complete_with_image` and `embed` gracefully
//! degrade (vision returns an error the loop treats as "handler not available",
//! embeddings fall back to [`local::LocalEmbeddingProvider`]).

pub mod local;
pub mod openrouter;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: String,
}

pub type ContentStream = std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResult, LlmError>;

    async fn stream(
        &self,
        messages: &[ChatMessage],
        system: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ContentStream, LlmError>;

    /// Vision path. Default: not configured (loop degrades gracefully per §4.1).
    async fn complete_with_image(
        &self,
        _image_bytes: &[u8],
        _media_type: &str,
        _prompt: &str,
        _system: &str,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }

    /// Embedding path. Default: not configured — callers should fall back to
    /// [`local::LocalEmbeddingProvider`] rather than treat this as fatal.
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::NotConfigured)
    }
}
