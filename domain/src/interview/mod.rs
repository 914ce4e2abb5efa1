//! Interview records
//!
//! - [`state::InterviewState`]: what an interview has answered and skipped so far
//! - [`environment::AnswerEnvironment`]: how rule conditions see that state
//! - [`result::InterviewResult`] / [`results::Results`]: what a run produced

pub mod environment;
pub mod exception;
pub mod result;
pub mod results;
pub mod state;

pub use environment::AnswerEnvironment;
pub use exception::{ErrorKind, ExceptionLog, InterviewException};
pub use result::{InterviewIdentity, InterviewResult, QuestionRecord, Usage};
pub use results::{FailedInterview, Results};
pub use state::{InterviewState, QuestionStatus};
