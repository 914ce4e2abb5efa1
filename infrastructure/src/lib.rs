//! Infrastructure layer for cohort
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration and survey file loading.

pub mod cache;
pub mod config;
pub mod logging;
pub mod providers;
pub mod survey;

// Re-export commonly used types
pub use cache::{CacheStats, InMemoryResponseCache};
pub use config::{
    ConfigKeyLookup, ConfigLoader, FileConfig, FileLoggingConfig, FileModelConfig,
    FileRetryConfig, FileRunConfig, FileServiceLimits,
};
pub use logging::JsonlInterviewLogger;
pub use providers::{CannedAnswer, CannedGateway, CannedResponses, CannedResponsesError};
pub use survey::{SurveyFile, SurveyFileError, SurveyParts};
