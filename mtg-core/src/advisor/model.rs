//! Language model seam for the advisor.

use async_trait::async_trait;
use claude::{Claude, Message, Request, Response, StopReason};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a [`LanguageModel`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("model returned an empty answer")]
    EmptyAnswer,

    #[error("answer was cut off at {max_tokens} tokens")]
    Truncated { max_tokens: usize },

    #[error("{0}")]
    Other(String),
}

/// Completes a fully assembled prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, context: &str) -> Result<String, ModelError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn complete(&self, context: &str) -> Result<String, ModelError> {
        (**self).complete(context).await
    }
}

/// [`LanguageModel`] backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeModel {
    client: Claude,
    max_tokens: usize,
    temperature: f32,
}

impl ClaudeModel {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            max_tokens: 1024,
            temperature: 0.1,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LanguageModel for ClaudeModel {
    async fn complete(&self, context: &str) -> Result<String, ModelError> {
        let request = Request::new(vec![Message::user(context)])
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let response = self.client.complete(request).await?;
        answer_text(response, self.max_tokens)
    }
}

/// Accept only complete, non-empty answers.
fn answer_text(response: Response, max_tokens: usize) -> Result<String, ModelError> {
    if response.stop_reason == StopReason::MaxTokens {
        tracing::warn!(
            max_tokens,
            output_tokens = response.usage.output_tokens,
            "answer hit the token limit"
        );
        return Err(ModelError::Truncated { max_tokens });
    }
    if response.text.trim().is_empty() {
        return Err(ModelError::EmptyAnswer);
    }
    Ok(response.text)
}
