//! Retry with exponential backoff for text-generation calls.
//!
//! Handles rate limiting, server errors and timeouts with a bounded attempt
//! count. Every attempt runs under its own timeout.

use super::{CollaboratorError, GenerationRequest, TextGenerator};
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Unit of the exponential backoff
    pub base_delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` when the error is final.
    ///
    /// - rate limited: 2, 4, 8 units
    /// - server error / timeout / network: 1, 2, 4 units
    pub fn delay_for(&self, error: &CollaboratorError, attempt: u32) -> Option<Duration> {
        match error {
            // The quota needs longer to reset than a transient server fault
            CollaboratorError::RateLimited => Some(self.base_delay * 2u32.pow(attempt + 1)),
            CollaboratorError::Server(_)
            | CollaboratorError::Timeout
            | CollaboratorError::Network(_) => Some(self.base_delay * 2u32.pow(attempt)),
            _ => None,
        }
    }
}

/// Call the generator until it succeeds, fails permanently, or the attempt
/// budget runs out.
pub async fn generate_with_retry<G>(
    generator: &G,
    request: &GenerationRequest,
    policy: &RetryPolicy,
    context: &str,
) -> Result<String, CollaboratorError>
where
    G: TextGenerator,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = CollaboratorError::Timeout;

    for attempt in 0..attempts {
        let result = match tokio::time::timeout(policy.timeout, generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout),
        };

        let error = match result {
            Ok(text) => {
                debug!(context, attempt, "Generation succeeded");
                return Ok(text);
            }
            Err(e) => e,
        };

        let Some(delay) = policy.delay_for(&error, attempt) else {
            warn!("{}: non-retriable error ({})", context, error);
            return Err(error);
        };

        if attempt + 1 < attempts {
            warn!("{}: {}, retrying in {:?}", context, error, delay);
            tokio::time::sleep(delay).await;
        }
        last = error;
    }

    warn!("{}: failed after {} attempt(s)", context, attempts);
    Err(CollaboratorError::Exhausted {
        attempts,
        last: Box::new(last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ChatMessage;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed sequence of outcomes
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, CollaboratorError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, CollaboratorError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl TextGenerator for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or(Err(CollaboratorError::Server(500)))
        }
    }

    /// Never answers within the timeout
    struct Stalled;

    impl TextGenerator for Stalled {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "test".to_string(),
            messages: vec![ChatMessage::user("describe")],
            max_tokens: 10,
            temperature: 0.0,
            top_p: 0.1,
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(&CollaboratorError::RateLimited, 0),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.delay_for(&CollaboratorError::Server(502), 2),
            Some(Duration::from_secs(4))
        );
        assert_eq!(policy.delay_for(&CollaboratorError::Http(404), 0), None);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let generator = Scripted::new(vec![
            Err(CollaboratorError::RateLimited),
            Err(CollaboratorError::Server(503)),
            Ok("An open palm".to_string()),
        ]);
        let result = generate_with_retry(&generator, &request(), &fast_policy(3), "test").await;
        assert_eq!(result.unwrap(), "An open palm");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let generator = Scripted::new(vec![]);
        let result = generate_with_retry(&generator, &request(), &fast_policy(3), "test").await;
        match result {
            Err(CollaboratorError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, CollaboratorError::Server(500));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_error_returns_immediately() {
        let generator = Scripted::new(vec![Err(CollaboratorError::Http(400)), Ok("never".into())]);
        let result = generate_with_retry(&generator, &request(), &fast_policy(3), "test").await;
        assert_eq!(result, Err(CollaboratorError::Http(400)));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let generator = Scripted::new(vec![Ok("once".into())]);
        let result = generate_with_retry(&generator, &request(), &fast_policy(0), "test").await;
        assert_eq!(result.unwrap(), "once");
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let result = generate_with_retry(&Stalled, &request(), &fast_policy(2), "stalled").await;
        match result {
            Err(CollaboratorError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(*last, CollaboratorError::Timeout);
            }
            other => panic!("expected timeout exhaustion, got {:?}", other),
        }
    }
}
