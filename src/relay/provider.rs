//! The completion-provider seam used by the chat relay.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::models::chat::MessageRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Completion provider is not configured")]
    NotConfigured,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed provider payload: {0}")]
    Decode(String),
}

/// Text fragments in provider order. An `Err` item ends the stream.
pub type TokenChunks = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens one streaming completion. Errors returned here happen before any
    /// token is produced.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<TokenChunks, ProviderError>;
}

/// Stand-in used when no API key is configured. Every call fails at setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn stream_completion(
        &self,
        _request: CompletionRequest,
    ) -> Result<TokenChunks, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}
