//! Shared utilities for use cases.
//!
//! Cancellation checks and cancellable sleeps used by the interview loop
//! and the runner.

use crate::ports::answer_validator::{AnswerValidator, KindValidator};
use crate::ports::llm_gateway::LlmGateway;
use crate::ports::progress::{InterviewObserver, NoProgress};
use crate::ports::prompt_renderer::{PromptRenderer, TemplatePromptRenderer};
use crate::ports::response_cache::{NoCache, ResponseCache};
use crate::ports::token_estimator::{CharRatioEstimator, TokenEstimator};
use crate::rate_limit::BucketCollection;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Whether cancellation has been requested.
pub(crate) fn is_cancelled(token: &Option<CancellationToken>) -> bool {
    token.as_ref().is_some_and(CancellationToken::is_cancelled)
}

/// Sleep for `duration` unless cancelled first.
///
/// Returns `false` if the sleep was interrupted by cancellation.
pub(crate) async fn sleep_cancellable(
    duration: Duration,
    token: &Option<CancellationToken>,
) -> bool {
    match token {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(duration) => true,
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            true
        }
    }
}

/// External collaborators an interview talks to.
///
/// Cheap to clone; every interview of a run holds the same instances.
#[derive(Clone)]
pub struct InterviewServices {
    pub gateway: Arc<dyn LlmGateway>,
    pub buckets: Arc<BucketCollection>,
    pub renderer: Arc<dyn PromptRenderer>,
    pub validator: Arc<dyn AnswerValidator>,
    pub cache: Arc<dyn ResponseCache>,
    pub estimator: Arc<dyn TokenEstimator>,
    pub observer: Arc<dyn InterviewObserver>,
}

impl InterviewServices {
    pub fn new(gateway: Arc<dyn LlmGateway>, buckets: Arc<BucketCollection>) -> Self {
        Self {
            gateway,
            buckets,
            renderer: Arc::new(TemplatePromptRenderer::new()),
            validator: Arc::new(KindValidator),
            cache: Arc::new(NoCache),
            estimator: Arc::new(CharRatioEstimator::default()),
            observer: Arc::new(NoProgress),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PromptRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn AnswerValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn InterviewObserver>) -> Self {
        self.observer = observer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_cancellable_interrupts() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_cancellable(Duration::from_secs(60), &Some(token)).await);
        assert!(sleep_cancellable(Duration::from_secs(1), &None).await);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(!is_cancelled(&None));
        let token = CancellationToken::new();
        assert!(!is_cancelled(&Some(token.clone())));
        token.cancel();
        assert!(is_cancelled(&Some(token)));
    }
}
