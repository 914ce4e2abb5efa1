//! LLM Gateway port
//!
//! Defines the interface for calling a language model. The transport itself
//! (HTTP, SDK, canned responses) lives in the infrastructure layer.

use async_trait::async_trait;
use cohort_domain::{LanguageModel, Usage};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during an LLM call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Network failures, 429s, 5xx: worth retrying
    #[error("Transient error: {0}")]
    Transient(String),

    /// Bad request, auth failure, unknown model: retrying won't help
    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Whether the interview should retry the call
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::Timeout(_))
    }
}

/// A rendered prompt: persona as the system message, question as the user message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// One model invocation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub service: String,
    pub model: String,
    pub prompt: Prompt,
    pub timeout: Duration,
    pub parameters: BTreeMap<String, Value>,
    /// Question being answered, for adapters that key responses by question
    pub question_name: String,
}

impl LlmRequest {
    pub fn new(
        model: &LanguageModel,
        prompt: Prompt,
        timeout: Duration,
        question_name: impl Into<String>,
    ) -> Self {
        Self {
            service: model.service.clone(),
            model: model.model.clone(),
            prompt,
            timeout,
            parameters: model.parameters.clone(),
            question_name: question_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Usage,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// Gateway for LLM communication
///
/// Implementations are expected to enforce `request.timeout` themselves; the
/// interview also wraps every call in its own timeout.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn invoke(&self, request: &LlmRequest) -> Result<LlmResponse, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Transient("429".into()).is_transient());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!GatewayError::Permanent("401".into()).is_transient());
    }

    #[test]
    fn test_request_copies_model_parameters() {
        let model = LanguageModel::new("m", "svc", 60.0, 600.0)
            .with_parameter("temperature", serde_json::json!(0.5));
        let request = LlmRequest::new(&model, Prompt::new("s", "u"), Duration::from_secs(5), "q0");
        assert_eq!(request.service, "svc");
        assert_eq!(request.parameters["temperature"], serde_json::json!(0.5));
    }
}
