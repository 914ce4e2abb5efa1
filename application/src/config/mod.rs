//! Application-level configuration.
//!
//! - [`RunParams`]: concurrency, iterations, failure policy, timeouts
//! - [`RetryPolicy`]: backoff for transient failures and corrective follow-ups for invalid answers

pub mod run_params;

pub use run_params::{RetryPolicy, RunParams};
