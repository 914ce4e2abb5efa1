//! Progress notification port
//!
//! Defines the callbacks fired while a job runs. Implementations live in the
//! infrastructure layer (JSONL event log) or the binary (console output).
//! Every callback defaults to a no-op so observers only implement what they use.

use cohort_domain::{InterviewException, InterviewResult, LanguageModel, QuestionRecord};

/// Callback for progress updates during a job run.
///
/// Shared by every interview task of the run, so callbacks may fire
/// concurrently from different interviews.
pub trait InterviewObserver: Send + Sync {
    /// Called once, before the first chunk
    fn on_run_start(&self, _total: usize, _max_concurrent: usize) {}

    /// Called when a chunk of interviews is launched
    fn on_chunk_start(&self, _chunk: usize, _size: usize) {}

    fn on_interview_start(&self, _index: usize, _agent: &str, _model: &LanguageModel) {}

    /// Called when the rules route around a question, without calling the model
    fn on_question_skipped(&self, _index: usize, _question: &str) {}

    fn on_question_answered(&self, _index: usize, _question: &str, _record: &QuestionRecord) {}

    /// Called for every recorded exception, including ones a retry later fixes
    fn on_exception(&self, _index: usize, _exception: &InterviewException) {}

    fn on_interview_complete(&self, _result: &InterviewResult) {}

    /// Called when an interview is excluded from the output
    fn on_interview_failed(&self, _index: usize, _error: &str) {}

    fn on_run_complete(&self, _completed: usize, _failed: usize) {}
}

/// No-op observer for when progress reporting is not needed
pub struct NoProgress;

impl InterviewObserver for NoProgress {}
