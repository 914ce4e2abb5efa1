//! Survey construction errors
//!
//! Every variant describes a survey that cannot be run. They are raised
//! while the survey is being built, except [`SurveyError::NoRuleAtNode`],
//! which surfaces when a branching decision finds nothing to apply.

use super::expression::ExpressionError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurveyError {
    #[error("Survey has no questions")]
    NoQuestions,

    #[error("Invalid question name '{0}': use letters, digits and '_', not starting with a digit")]
    InvalidQuestionName(String),

    #[error("Duplicate question name '{0}'")]
    DuplicateQuestionName(String),

    #[error("Unknown question '{0}'")]
    UnknownQuestion(String),

    #[error("Question index {index} is out of range for a survey of {count} questions")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid expression '{source_text}': {error}")]
    Expression {
        source_text: String,
        error: ExpressionError,
    },

    #[error("Rule at question {current_q} references '{referenced}' (question {referenced_q}), which is not answered yet")]
    ForwardReference {
        current_q: usize,
        referenced: String,
        referenced_q: usize,
    },

    #[error("Rule at question {current_q} jumps backwards to question {next_q}")]
    BackwardJump { current_q: usize, next_q: usize },

    #[error("Rule at question {0} routes back to itself")]
    SelfLoop(usize),

    #[error("Priority {priority} at question {current_q} is reserved for the default rule")]
    ReservedPriority { current_q: usize, priority: i32 },

    #[error("Two rules at question {current_q} share priority {priority}")]
    PriorityTie { current_q: usize, priority: i32 },

    #[error("No rule applies at question {0}")]
    NoRuleAtNode(usize),

    #[error("Question '{focal}' cannot remember '{prior}': memories must come from earlier questions")]
    InvalidMemory { focal: String, prior: String },
}
