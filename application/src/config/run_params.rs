//! Run parameters: scheduling, retry and throttling control.
//!
//! [`RunParams`] groups the knobs that control one job run. It is built once
//! (usually from a config file) and passed by reference into
//! [`Jobs`](crate::use_cases::run_jobs::Jobs), the runner and every interview.

use cohort_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for failed LLM calls and invalid answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after a transient failure (0 = just the initial call).
    pub max_transient_retries: u32,
    /// Base delay for exponential backoff (doubled on each retry).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Corrective follow-up calls after an answer fails validation.
    pub max_validation_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_validation_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// No retries of any kind
    pub fn none() -> Self {
        Self {
            max_transient_retries: 0,
            max_validation_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }
}

/// Job-level run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Interviews in flight at once (chunk size).
    pub max_concurrent: usize,
    /// Repetitions of every (agent, scenario, model) combination.
    pub n_iterations: usize,
    /// Abort the run on the first interview failure.
    pub stop_on_exception: bool,
    /// Treat an answer that stays invalid after retries as an interview failure.
    pub raise_validation_errors: bool,
    /// Consult the response cache before calling the model.
    pub use_cache: bool,
    /// Size every bucket at +∞ (never throttle).
    pub infinity_buckets: bool,
    /// Per-call timeout handed to the gateway and enforced around it.
    pub llm_timeout: Duration,
    /// Longest a single bucket acquisition may wait before it counts as starvation.
    pub max_bucket_wait: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            n_iterations: 1,
            stop_on_exception: false,
            raise_validation_errors: false,
            use_cache: true,
            infinity_buckets: false,
            llm_timeout: Duration::from_secs(180),
            max_bucket_wait: Some(Duration::from_secs(600)),
            retry: RetryPolicy::default(),
        }
    }
}

impl RunParams {
    // ==================== Builder Methods ====================

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_iterations(mut self, n: usize) -> Self {
        self.n_iterations = n;
        self
    }

    pub fn with_stop_on_exception(mut self, stop: bool) -> Self {
        self.stop_on_exception = stop;
        self
    }

    pub fn with_raise_validation_errors(mut self, raise: bool) -> Self {
        self.raise_validation_errors = raise;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_infinity_buckets(mut self, enabled: bool) -> Self {
        self.infinity_buckets = enabled;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_max_bucket_wait(mut self, wait: Option<Duration>) -> Self {
        self.max_bucket_wait = wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ==================== Validation ====================

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.max_concurrent == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroConcurrency,
                "max_concurrent must be at least 1",
            ));
        }
        if self.n_iterations == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroIterations,
                "n_iterations must be at least 1",
            ));
        }
        if self.llm_timeout.is_zero() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroTimeout,
                "llm_timeout must be greater than zero",
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidRetryPolicy,
                format!(
                    "retry base_delay ({:?}) exceeds max_delay ({:?}); every retry waits max_delay",
                    self.retry.base_delay, self.retry.max_delay
                ),
            ));
        }
        issues
    }
}
