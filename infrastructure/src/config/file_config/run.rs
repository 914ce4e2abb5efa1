//! Run settings from TOML (`[run]` section)

use cohort_application::{RetryPolicy, RunParams};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run settings from TOML
///
/// # Example
///
/// ```toml
/// [run]
/// max_concurrent = 10
/// n_iterations = 2
/// llm_timeout_secs = 120
/// max_bucket_wait_secs = 0    # 0 = wait as long as the buckets need
///
/// [run.retry]
/// max_transient_retries = 5
/// base_delay_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRunConfig {
    pub max_concurrent: usize,
    pub n_iterations: usize,
    pub stop_on_exception: bool,
    pub raise_validation_errors: bool,
    pub use_cache: bool,
    pub infinity_buckets: bool,
    pub llm_timeout_secs: u64,
    pub max_bucket_wait_secs: u64,
    pub retry: FileRetryConfig,
}

impl Default for FileRunConfig {
    fn default() -> Self {
        let params = RunParams::default();
        Self {
            max_concurrent: params.max_concurrent,
            n_iterations: params.n_iterations,
            stop_on_exception: params.stop_on_exception,
            raise_validation_errors: params.raise_validation_errors,
            use_cache: params.use_cache,
            infinity_buckets: params.infinity_buckets,
            llm_timeout_secs: params.llm_timeout.as_secs(),
            max_bucket_wait_secs: params.max_bucket_wait.map_or(0, |d| d.as_secs()),
            retry: FileRetryConfig::default(),
        }
    }
}

impl FileRunConfig {
    pub fn to_run_params(&self) -> RunParams {
        let max_bucket_wait =
            (self.max_bucket_wait_secs > 0).then(|| Duration::from_secs(self.max_bucket_wait_secs));
        RunParams::default()
            .with_max_concurrent(self.max_concurrent)
            .with_iterations(self.n_iterations)
            .with_stop_on_exception(self.stop_on_exception)
            .with_raise_validation_errors(self.raise_validation_errors)
            .with_cache(self.use_cache)
            .with_infinity_buckets(self.infinity_buckets)
            .with_llm_timeout(Duration::from_secs(self.llm_timeout_secs))
            .with_max_bucket_wait(max_bucket_wait)
            .with_retry(self.retry.to_retry_policy())
    }
}

/// Backoff settings (`[run.retry]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRetryConfig {
    pub max_transient_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub max_validation_retries: u32,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_transient_retries: policy.max_transient_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_secs: policy.max_delay.as_secs(),
            max_validation_retries: policy.max_validation_retries,
        }
    }
}

impl FileRetryConfig {
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_transient_retries: self.max_transient_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            max_validation_retries: self.max_validation_retries,
        }
    }
}
