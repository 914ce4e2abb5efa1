//! Logging infrastructure: structured interview event logging.
//!
//! Provides [`JsonlInterviewLogger`], a JSONL file writer that implements
//! the [`InterviewObserver`](cohort_application::InterviewObserver) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlInterviewLogger;
