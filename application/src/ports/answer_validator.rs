//! Answer validation port

use cohort_domain::{Question, ValidationError};
use serde_json::Value;

/// Turns raw model output into a typed answer for a question
pub trait AnswerValidator: Send + Sync {
    fn validate(&self, question: &Question, raw: &str) -> Result<Value, ValidationError>;
}

/// Validates against the question's own kind
pub struct KindValidator;

impl AnswerValidator for KindValidator {
    fn validate(&self, question: &Question, raw: &str) -> Result<Value, ValidationError> {
        question.validate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delegates_to_question_kind() {
        let question = Question::yes_no("q0", "Tea?");
        assert_eq!(KindValidator.validate(&question, "Yes").unwrap(), json!("yes"));
        assert!(KindValidator.validate(&question, "sometimes").is_err());
    }
}
