//! Aggregate of every interview a job ran

use super::result::{InterviewResult, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An interview that did not complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedInterview {
    pub index: usize,
    pub agent: String,
    pub model: String,
    pub error: String,
    /// Whatever the interview gathered before it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<InterviewResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    completed: Vec<InterviewResult>,
    failed: Vec<FailedInterview>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: InterviewResult) {
        self.completed.push(result);
    }

    pub fn push_failed(&mut self, failed: FailedInterview) {
        self.failed.push(failed);
    }

    /// Merge a re-run into this set, replacing entries with the same index
    pub fn merge(&mut self, other: Results) {
        for result in other.completed {
            self.failed.retain(|f| f.index != result.index);
            self.completed.retain(|r| r.index != result.index);
            self.completed.push(result);
        }
        for failed in other.failed {
            self.completed.retain(|r| r.index != failed.index);
            self.failed.retain(|f| f.index != failed.index);
            self.failed.push(failed);
        }
        self.sort();
    }

    /// Order both lists by interview index
    pub fn sort(&mut self) {
        self.completed.sort_by_key(|r| r.index);
        self.failed.sort_by_key(|f| f.index);
    }

    pub fn completed(&self) -> &[InterviewResult] {
        &self.completed
    }

    pub fn failed(&self) -> &[FailedInterview] {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterviewResult> {
        self.completed.iter()
    }

    /// Indices worth re-running: failed interviews and completed ones with unfixed exceptions
    pub fn failed_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .failed
            .iter()
            .map(|f| f.index)
            .chain(
                self.completed
                    .iter()
                    .filter(|r| r.has_unfixed_exceptions())
                    .map(|r| r.index),
            )
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn total_usage(&self) -> Usage {
        let mut usage = Usage::default();
        for result in &self.completed {
            usage += result.usage;
        }
        usage
    }

    /// The answer to `question_name` from each completed interview, in index order
    pub fn answers_for(&self, question_name: &str) -> Vec<Option<&Value>> {
        self.completed
            .iter()
            .map(|r| r.answer(question_name))
            .collect()
    }
}
