//! Bounded worker pool for independent collaborator fetches

use super::cache::{CacheKey, ResponseCache};
use super::http_retry::{generate_with_retry, RetryPolicy};
use super::{CollaboratorError, GenerationRequest, TextGenerator};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// One fetch, identified by a caller-chosen id
#[derive(Debug, Clone)]
pub struct FetchJob<K> {
    pub id: K,
    pub cache_key: CacheKey,
    pub request: GenerationRequest,
}

/// Run all jobs with at most `concurrency` calls in flight.
///
/// Cached responses are returned without a call; fresh responses are cached.
/// Results come back sorted by job id, whatever order the calls finished in.
pub async fn fetch_all<G, K>(
    generator: Arc<G>,
    jobs: Vec<FetchJob<K>>,
    cache: &ResponseCache,
    policy: &RetryPolicy,
    concurrency: usize,
) -> Vec<(K, Result<String, CollaboratorError>)>
where
    G: TextGenerator + 'static,
    K: Ord + Clone + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut results = Vec::with_capacity(jobs.len());
    let mut handles = Vec::new();
    let total = jobs.len();

    for job in jobs {
        if let Some(text) = cache.get(&job.cache_key) {
            results.push((job.id, Ok(text)));
            continue;
        }

        let generator = generator.clone();
        let semaphore = semaphore.clone();
        let cache = cache.clone();
        let policy = policy.clone();

        let id = job.id.clone();
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return (job.id, Err(CollaboratorError::Worker(e.to_string()))),
            };
            let context = format!("{} [{}]", job.cache_key.subject, job.request.model);
            let result = generate_with_retry(&*generator, &job.request, &policy, &context).await;
            if let Ok(text) = &result {
                cache.put(&job.cache_key, text);
            }
            (job.id, result)
        });
        handles.push((id, handle));
    }

    let fetched = handles.len();
    debug!(total, cached = total - fetched, fetched, "Dispatched collaborator jobs");

    for (id, handle) in handles {
        match handle.await {
            Ok(outcome) => results.push(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Collaborator worker panicked");
                results.push((id, Err(CollaboratorError::Worker(e.to_string()))));
            }
        }
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    info!(
        total,
        succeeded = results.iter().filter(|(_, r)| r.is_ok()).count(),
        "Collaborator batch finished"
    );
    results
}

/// Drive an async batch from synchronous code on a fresh runtime
pub fn run_blocking<F: Future>(future: F) -> crate::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the prompt after a delay inversely related to its id, tracking peak concurrency
    struct Echo {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextGenerator for Echo {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let prompt = request.messages[0].content.clone();
            let delay = 20u64.saturating_sub(prompt.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if prompt.contains("fail") {
                Err(CollaboratorError::Http(400))
            } else {
                Ok(format!("echo {}", prompt))
            }
        }
    }

    fn job(id: usize, prompt: &str) -> FetchJob<usize> {
        FetchJob {
            id,
            cache_key: CacheKey::new(format!("k{}", id), "echo", "t"),
            request: GenerationRequest {
                model: "echo".into(),
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: 10,
                temperature: 0.0,
                top_p: 1.0,
            },
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_results_sorted_and_concurrency_bounded() {
        let generator = Arc::new(Echo::new());
        let jobs: Vec<_> = (0..10).map(|i| job(i, &"x".repeat(i))).collect();
        let cache = ResponseCache::memory();

        let results = fetch_all(generator.clone(), jobs, &cache, &policy(), 3).await;

        let ids: Vec<usize> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert!(generator.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(results[2].1.as_deref(), Ok("echo xx"));
    }

    #[tokio::test]
    async fn test_cached_jobs_skip_the_call() {
        let generator = Arc::new(Echo::new());
        let cache = ResponseCache::memory();

        let first = fetch_all(generator.clone(), vec![job(1, "a"), job(2, "b")], &cache, &policy(), 2).await;
        assert_eq!(first.len(), 2);
        let second = fetch_all(generator.clone(), vec![job(1, "a"), job(2, "b")], &cache, &policy(), 2).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second[0].1.as_deref(), Ok("echo a"));
        assert_eq!(cache.hits(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_per_job() {
        let generator = Arc::new(Echo::new());
        let cache = ResponseCache::memory();
        let results = fetch_all(generator, vec![job(1, "ok"), job(2, "fail")], &cache, &policy(), 2).await;

        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1, Err(CollaboratorError::Http(400)));
        // failures are not cached
        assert!(cache.get(&job(2, "fail").cache_key).is_none());
    }

    #[test]
    fn test_run_blocking() {
        let value = run_blocking(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }
}
