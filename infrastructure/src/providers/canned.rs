//! Deterministic gateway answering from a table of canned responses
//!
//! ```toml
//! default = "I'd rather not say."
//! latency_ms = 50
//!
//! [answers]
//! drinks_tea = "yes"
//! favorite = ["green", "black"]   # cycled per call
//!
//! [failures]
//! cups = "permanent"               # or "transient"
//! ```

use async_trait::async_trait;
use cohort_application::{
    CharRatioEstimator, GatewayError, LlmGateway, LlmRequest, LlmResponse, TokenEstimator,
};
use cohort_domain::Usage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CannedResponsesError {
    #[error("Could not read responses file {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Malformed responses file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One answer, or several used in rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CannedAnswer {
    One(String),
    Many(Vec<String>),
}

impl CannedAnswer {
    fn pick(&self, call: usize) -> Option<&str> {
        match self {
            CannedAnswer::One(answer) => Some(answer),
            CannedAnswer::Many(answers) if answers.is_empty() => None,
            CannedAnswer::Many(answers) => Some(&answers[call % answers.len()]),
        }
    }
}

/// Simulated failure for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CannedFailure {
    Transient,
    Permanent,
}

/// Raw responses file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannedResponses {
    /// Answer for questions without an entry; none means such calls fail
    pub default: Option<String>,
    pub latency_ms: u64,
    pub answers: BTreeMap<String, CannedAnswer>,
    pub failures: BTreeMap<String, CannedFailure>,
}

impl CannedResponses {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CannedResponsesError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| CannedResponsesError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

/// [`LlmGateway`] that never leaves the process.
///
/// Usage is estimated from prompt and answer length.
pub struct CannedGateway {
    responses: CannedResponses,
    latency: Duration,
    calls: Mutex<HashMap<String, usize>>,
    estimator: CharRatioEstimator,
}

impl CannedGateway {
    pub fn new(responses: CannedResponses) -> Self {
        Self {
            latency: Duration::from_millis(responses.latency_ms),
            responses,
            calls: Mutex::new(HashMap::new()),
            estimator: CharRatioEstimator::default(),
        }
    }

    /// Calls received for `question` so far
    pub fn calls_for(&self, question: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(question).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn next_call(&self, question: &str) -> usize {
        match self.calls.lock() {
            Ok(mut calls) => {
                let count = calls.entry(question.to_string()).or_insert(0);
                *count += 1;
                *count - 1
            }
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl LlmGateway for CannedGateway {
    async fn invoke(&self, request: &LlmRequest) -> Result<LlmResponse, GatewayError> {
        let call = self.next_call(&request.question_name);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.responses.failures.get(&request.question_name) {
            Some(CannedFailure::Transient) => {
                return Err(GatewayError::Transient(format!(
                    "simulated outage for '{}'",
                    request.question_name
                )));
            }
            Some(CannedFailure::Permanent) => {
                return Err(GatewayError::Permanent(format!(
                    "simulated rejection for '{}'",
                    request.question_name
                )));
            }
            None => {}
        }

        let answer = self
            .responses
            .answers
            .get(&request.question_name)
            .and_then(|a| a.pick(call))
            .or(self.responses.default.as_deref())
            .ok_or_else(|| {
                GatewayError::Permanent(format!(
                    "no canned response for question '{}'",
                    request.question_name
                ))
            })?;

        debug!(
            service = %request.service,
            model = %request.model,
            question = %request.question_name,
            call,
            "Canned response"
        );
        let usage = Usage {
            input_tokens: self.estimator.estimate(&request.prompt),
            output_tokens: (answer.chars().count() as u64).div_ceil(4),
        };
        Ok(LlmResponse::new(answer, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_application::Prompt;
    use cohort_domain::LanguageModel;

    fn request(question: &str) -> LlmRequest {
        LlmRequest::new(
            &LanguageModel::new("m", "s", 60.0, 6000.0),
            Prompt::new("persona", "Question?"),
            Duration::from_secs(5),
            question,
        )
    }

    fn responses() -> CannedResponses {
        toml::from_str(
            r#"
[answers]
drinks_tea = "yes"
favorite = ["green", "black"]

[failures]
cups = "transient"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_answers_rotate_per_question() {
        let gateway = CannedGateway::new(responses());
        let first = gateway.invoke(&request("favorite")).await.unwrap();
        let second = gateway.invoke(&request("favorite")).await.unwrap();
        let third = gateway.invoke(&request("favorite")).await.unwrap();
        assert_eq!(
            [first.content, second.content, third.content],
            ["green", "black", "green"]
        );
        assert_eq!(gateway.invoke(&request("drinks_tea")).await.unwrap().content, "yes");
        assert_eq!(gateway.calls_for("favorite"), 3);
    }

    #[tokio::test]
    async fn test_missing_answer_without_default_is_permanent() {
        let gateway = CannedGateway::new(responses());
        let err = gateway.invoke(&request("unknown")).await.unwrap_err();
        assert!(!err.is_transient());

        let mut with_default = responses();
        with_default.default = Some("no idea".into());
        let gateway = CannedGateway::new(with_default);
        assert_eq!(gateway.invoke(&request("unknown")).await.unwrap().content, "no idea");
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let gateway = CannedGateway::new(responses());
        assert!(gateway.invoke(&request("cups")).await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_usage_is_estimated() {
        let gateway = CannedGateway::new(responses());
        let response = gateway.invoke(&request("drinks_tea")).await.unwrap();
        // 4 + 4 overhead, 2 tokens of system prompt, 3 of user prompt
        assert_eq!(response.usage.input_tokens, 13);
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let mut slow = responses();
        slow.latency_ms = 1500;
        let gateway = CannedGateway::new(slow);
        let start = tokio::time::Instant::now();
        gateway.invoke(&request("drinks_tea")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn test_load_reports_path() {
        let err = CannedResponses::load("/definitely/missing/responses.toml").unwrap_err();
        assert!(err.to_string().contains("responses.toml"));
    }
}
