//! Language model value object

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One backend model configuration (Value Object)
///
/// Rate limits are expressed per minute, the way providers publish them.
/// Models that share a `service` also share that service's rate-limit buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageModel {
    /// Provider-side model identifier (e.g. `gpt-4o`)
    pub model: String,
    /// Backend service the model belongs to (e.g. `openai`)
    pub service: String,
    /// Requests per minute
    pub rpm: f64,
    /// Tokens per minute
    pub tpm: f64,
    /// Sampling parameters forwarded to the provider (temperature, max_tokens, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl LanguageModel {
    pub fn new(model: impl Into<String>, service: impl Into<String>, rpm: f64, tpm: f64) -> Self {
        Self {
            model: model.into(),
            service: service.into(),
            rpm,
            tpm,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Requests per second derived from `rpm`
    pub fn requests_per_second(&self) -> f64 {
        self.rpm / 60.0
    }

    /// Tokens per second derived from `tpm`
    pub fn tokens_per_second(&self) -> f64 {
        self.tpm / 60.0
    }

    /// Canonical JSON of the parameters (keys sorted), used for cache fingerprints
    pub fn parameters_json(&self) -> String {
        serde_json::to_string(&self.parameters).unwrap_or_default()
    }
}

impl std::fmt::Display for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service, self.model)
    }
}
