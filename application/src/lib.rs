//! Application layer for cohort
//!
//! This crate contains use cases, port definitions, rate limiting and run
//! configuration. It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod rate_limit;
pub mod use_cases;

// Re-export commonly used types
pub use config::{RetryPolicy, RunParams};
pub use ports::{
    answer_validator::{AnswerValidator, KindValidator},
    key_lookup::{KeyLookup, NoKeyLookup, ServiceLimits},
    llm_gateway::{GatewayError, LlmGateway, LlmRequest, LlmResponse, Prompt},
    progress::{InterviewObserver, NoProgress},
    prompt_renderer::{MemoryEntry, PromptRenderer, RenderError, TemplatePromptRenderer},
    response_cache::{CachedResponse, NoCache, ResponseCache, fingerprint},
    token_estimator::{CharRatioEstimator, TokenEstimator},
};
pub use rate_limit::{BucketCollection, BucketSnapshot, ModelBuckets, RateLimitError, TokenBucket};
pub use use_cases::interview::{Interview, InterviewError};
pub use use_cases::run_interviews::{AsyncInterviewRunner, ResultStream, RunnerError, RunnerEvent};
pub use use_cases::run_jobs::{Jobs, JobsError, validate_models};
pub use use_cases::shared::InterviewServices;
