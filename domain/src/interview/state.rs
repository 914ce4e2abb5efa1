//! Mutable per-interview state
//!
//! Tracks which questions were answered, which were skipped and what went
//! wrong along the way. Answers and skip flags are mutually exclusive: a
//! question is either answered, skipped, or not reached yet.

use super::exception::{ExceptionLog, InterviewException};
use super::result::{QuestionRecord, Usage};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionStatus {
    Pending,
    Answered,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct InterviewState {
    names: Vec<String>,
    status: Vec<QuestionStatus>,
    answers: BTreeMap<String, Value>,
    records: BTreeMap<String, QuestionRecord>,
    exceptions: ExceptionLog,
    usage: Usage,
    cache_hits: usize,
}

impl InterviewState {
    pub fn new(names: &[String]) -> Self {
        Self {
            names: names.to_vec(),
            status: vec![QuestionStatus::Pending; names.len()],
            answers: BTreeMap::new(),
            records: BTreeMap::new(),
            exceptions: ExceptionLog::new(),
            usage: Usage::default(),
            cache_hits: 0,
        }
    }

    pub fn answers(&self) -> &BTreeMap<String, Value> {
        &self.answers
    }

    pub fn status(&self, index: usize) -> Option<&QuestionStatus> {
        self.status.get(index)
    }

    pub fn is_skipped(&self, index: usize) -> bool {
        self.status(index) == Some(&QuestionStatus::Skipped)
    }

    /// Store the answer for question `index`.
    ///
    /// A `None` answer (the question could not be answered) still marks the
    /// question as asked; it just leaves no value for later rules to see.
    pub fn commit(&mut self, index: usize, answer: Option<Value>, record: QuestionRecord) {
        let Some(name) = self.names.get(index).cloned() else {
            return;
        };
        self.status[index] = QuestionStatus::Answered;
        if let Some(value) = answer {
            self.answers.insert(name.clone(), value);
        }
        if record.cached {
            self.cache_hits += 1;
        }
        self.usage.add(record.input_tokens, record.output_tokens);
        self.records.insert(name, record);
    }

    pub fn skip(&mut self, index: usize) {
        if let Some(status) = self.status.get_mut(index)
            && *status == QuestionStatus::Pending
        {
            *status = QuestionStatus::Skipped;
        }
    }

    /// Mark every question not yet reached as skipped
    pub fn skip_remaining(&mut self) {
        for status in self.status.iter_mut() {
            if *status == QuestionStatus::Pending {
                *status = QuestionStatus::Skipped;
            }
        }
    }

    pub fn record_exception(&mut self, exception: InterviewException) {
        self.exceptions.record(exception);
    }

    pub fn mark_fixed(&mut self, question_name: &str) {
        self.exceptions.mark_fixed(question_name);
    }

    pub fn exceptions(&self) -> &ExceptionLog {
        &self.exceptions
    }

    pub fn skipped_names(&self) -> Vec<String> {
        self.names
            .iter()
            .zip(&self.status)
            .filter(|(_, s)| **s == QuestionStatus::Skipped)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn skip_flags(&self) -> Vec<bool> {
        self.status
            .iter()
            .map(|s| *s == QuestionStatus::Skipped)
            .collect()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<String, Value>,
        BTreeMap<String, QuestionRecord>,
        ExceptionLog,
        Usage,
        usize,
    ) {
        (
            self.answers,
            self.records,
            self.exceptions,
            self.usage,
            self.cache_hits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names() -> Vec<String> {
        vec!["q0".into(), "q1".into(), "q2".into()]
    }

    #[test]
    fn test_answers_and_skips_are_disjoint() {
        let mut state = InterviewState::new(&names());
        state.commit(0, Some(json!("yes")), QuestionRecord::default());
        state.skip(0);
        state.skip(1);

        assert_eq!(state.status(0), Some(&QuestionStatus::Answered));
        assert!(state.is_skipped(1));
        assert_eq!(state.skipped_names(), vec!["q1".to_string()]);
        assert_eq!(state.answers().len(), 1);
    }

    #[test]
    fn test_skip_remaining_only_touches_pending() {
        let mut state = InterviewState::new(&names());
        state.commit(0, Some(json!(1)), QuestionRecord::default());
        state.skip_remaining();
        assert_eq!(state.skip_flags(), vec![false, true, true]);
    }

    #[test]
    fn test_commit_accumulates_usage_and_cache_hits() {
        let mut state = InterviewState::new(&names());
        let record = QuestionRecord {
            cached: true,
            input_tokens: 10,
            output_tokens: 2,
            ..QuestionRecord::default()
        };
        state.commit(0, None, record);
        let (answers, records, _, usage, hits) = state.into_parts();
        assert!(answers.is_empty());
        assert!(records.contains_key("q0"));
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(hits, 1);
    }
}
