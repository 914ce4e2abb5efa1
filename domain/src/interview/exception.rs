//! Per-question exception records
//!
//! Interviews never stop on a model failure; they write it down here and move
//! on. A failure that a later retry cured stays in the log marked `fixed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// LLM call failed in a way worth retrying (network, rate limit, timeout, bucket starvation)
    Transient,
    /// LLM call failed in a way retrying won't fix
    Permanent,
    /// Model output did not match the question's expected shape
    Validation,
    /// Prompt could not be rendered
    Render,
    /// Cancellation observed mid-question
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Validation => "validation",
            ErrorKind::Render => "render",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewException {
    pub question_name: String,
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based attempt number the failure happened on
    pub attempt: u32,
    /// A later attempt for the same question succeeded
    pub fixed: bool,
    pub timestamp: DateTime<Utc>,
}

impl InterviewException {
    pub fn new(
        question_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            question_name: question_name.into(),
            kind,
            message: message.into(),
            attempt,
            fixed: false,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered exception log of one interview
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionLog {
    entries: Vec<InterviewException>,
}

impl ExceptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, exception: InterviewException) {
        self.entries.push(exception);
    }

    /// Mark every open exception for `question_name` as fixed
    pub fn mark_fixed(&mut self, question_name: &str) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.question_name == question_name)
        {
            entry.fixed = true;
        }
    }

    pub fn entries(&self) -> &[InterviewException] {
        &self.entries
    }

    pub fn unfixed(&self) -> impl Iterator<Item = &InterviewException> {
        self.entries.iter().filter(|e| !e.fixed)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_entries(self) -> Vec<InterviewException> {
        self.entries
    }
}
