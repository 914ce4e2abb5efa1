//! Outcome of one interview

use super::exception::{ErrorKind, ExceptionLog, InterviewException};
use super::state::InterviewState;
use crate::core::agent::{Agent, Scenario};
use crate::core::model::LanguageModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.add(rhs.input_tokens, rhs.output_tokens);
    }
}

/// Per-question bookkeeping for an asked question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Final raw model output (after retries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Answer came from the response cache
    pub cached: bool,
    /// Number of LLM calls made for this question
    pub attempts: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// The answer passed validation
    pub validated: bool,
}

/// Everything one interview produced.
///
/// `answers` only holds questions that were asked and produced a value;
/// `skipped` lists questions the rules routed around, in survey order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewResult {
    /// Position of the interview in the job's expansion order
    pub index: usize,
    pub iteration: usize,
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: LanguageModel,
    pub answers: BTreeMap<String, Value>,
    pub skipped: Vec<String>,
    pub records: BTreeMap<String, QuestionRecord>,
    pub exceptions: ExceptionLog,
    pub usage: Usage,
    pub cache_hits: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Identity of an interview within a job
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewIdentity {
    pub index: usize,
    pub iteration: usize,
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: LanguageModel,
}

impl InterviewResult {
    pub fn from_state(
        identity: InterviewIdentity,
        state: InterviewState,
        started_at: DateTime<Utc>,
    ) -> Self {
        let skipped = state.skipped_names();
        let (answers, records, exceptions, usage, cache_hits) = state.into_parts();
        Self {
            index: identity.index,
            iteration: identity.iteration,
            agent: identity.agent,
            scenario: identity.scenario,
            model: identity.model,
            answers,
            skipped,
            records,
            exceptions,
            usage,
            cache_hits,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn answer(&self, question_name: &str) -> Option<&Value> {
        self.answers.get(question_name)
    }

    pub fn was_skipped(&self, question_name: &str) -> bool {
        self.skipped.iter().any(|s| s == question_name)
    }

    pub fn unfixed_exceptions(&self) -> impl Iterator<Item = &InterviewException> {
        self.exceptions.unfixed()
    }

    pub fn has_unfixed_exceptions(&self) -> bool {
        self.exceptions.unfixed().next().is_some()
    }

    /// `(question, kind, message)` for every unfixed exception
    pub fn error_summary(&self) -> Vec<(String, ErrorKind, String)> {
        self.unfixed_exceptions()
            .map(|e| (e.question_name.clone(), e.kind, e.message.clone()))
            .collect()
    }
}
