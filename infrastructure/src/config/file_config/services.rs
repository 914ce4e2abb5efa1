//! Per-service rate limit overrides (`[services.<name>]`)

use serde::{Deserialize, Serialize};

/// Rate limits for one service, overriding what its models declare
///
/// # Example
///
/// ```toml
/// [services.openai]
/// rpm = 10000
/// tpm = 2000000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileServiceLimits {
    pub rpm: f64,
    pub tpm: f64,
}
