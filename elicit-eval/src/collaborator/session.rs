//! A configured collaborator: generator, sampling settings, cache and pool size

use super::cache::ResponseCache;
use super::http_retry::RetryPolicy;
use super::pool::{fetch_all, run_blocking, FetchJob};
use super::{ChatMessage, CollaboratorError, GenerationRequest, TextGenerator};
use std::sync::Arc;

/// Sampling parameters shared by every request of a stage
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 200,
            temperature: 0.0,
            top_p: 0.1,
        }
    }
}

impl GenerationSettings {
    pub fn request(&self, messages: Vec<ChatMessage>) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

/// Everything a stage needs to fan requests out to the collaborator
pub struct Collaborator<G> {
    pub generator: Arc<G>,
    pub settings: GenerationSettings,
    pub cache: ResponseCache,
    pub policy: RetryPolicy,
    pub concurrency: usize,
}

impl<G> Clone for Collaborator<G> {
    fn clone(&self) -> Self {
        Self {
            generator: self.generator.clone(),
            settings: self.settings.clone(),
            cache: self.cache.clone(),
            policy: self.policy.clone(),
            concurrency: self.concurrency,
        }
    }
}

impl<G: TextGenerator + 'static> Collaborator<G> {
    pub fn new(generator: G, settings: GenerationSettings) -> Self {
        Self {
            generator: Arc::new(generator),
            settings,
            cache: ResponseCache::disabled(),
            policy: RetryPolicy::default(),
            concurrency: 4,
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Model name requests are sent with
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub async fn fetch<K>(&self, jobs: Vec<FetchJob<K>>) -> Vec<(K, Result<String, CollaboratorError>)>
    where
        K: Ord + Clone + Send + 'static,
    {
        fetch_all(self.generator.clone(), jobs, &self.cache, &self.policy, self.concurrency).await
    }

    /// Run a batch to completion from synchronous code
    pub fn fetch_blocking<K>(&self, jobs: Vec<FetchJob<K>>) -> crate::Result<Vec<(K, Result<String, CollaboratorError>)>>
    where
        K: Ord + Clone + Send + 'static,
    {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        run_blocking(self.fetch(jobs))
    }
}
