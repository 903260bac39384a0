//! Text-Generation Collaborator
//!
//! The language model is an external collaborator behind the
//! [`TextGenerator`] trait. Calls are retried with backoff, cached on disk
//! and fanned out over a bounded worker pool.

pub mod client;
pub mod http_retry;
pub mod cache;
pub mod pool;
pub mod session;

use serde::{Deserialize, Serialize};
use std::future::Future;

pub use client::ChatCompletionsClient;
pub use http_retry::{generate_with_retry, RetryPolicy};
pub use cache::{CacheKey, CacheStore, FsCacheStore, MemoryCacheStore, ResponseCache};
pub use pool::{fetch_all, run_blocking, FetchJob};
pub use session::{Collaborator, GenerationSettings};

/// Failure of a single text-generation call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("server error (HTTP {0})")]
    Server(u16),

    #[error("request rejected (HTTP {0})")]
    Http(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("collaborator not configured: {0}")]
    NotConfigured(String),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<CollaboratorError>,
    },
}

impl CollaboratorError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::Server(_) | Self::Network(_)
        )
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A prompt plus sampling parameters for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Anything that turns a prompt into text
pub trait TextGenerator: Send + Sync {
    /// Perform a single attempt; retries are layered on top
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;
}
