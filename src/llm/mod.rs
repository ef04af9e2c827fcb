use async_trait::async_trait;
use thiserror::Error;

pub mod client;

pub use client::LlmClient;

/// Failures from the completion API. None of these are fatal; they are
/// surfaced to the invoking command and never retried automatically.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion API rejected the credentials: {0}")]
    Auth(String),
    #[error("completion API rate limit hit: {0}")]
    RateLimit(String),
    #[error("network error reaching the completion API: {0}")]
    Network(String),
    #[error("completion API returned a malformed response: {0}")]
    Malformed(String),
    #[error("completion API call timed out after {0}s")]
    Timeout(u64),
    #[error("completion API error: {0}")]
    Api(String),
}

/// Prompt in, text out. The production implementation is `LlmClient`;
/// tests substitute stubs.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}
