//! Domain error types

use thiserror::Error;

/// Raised when a model's answer does not match the question's expected shape
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty answer")]
    Empty,

    #[error("Answer '{answer}' is not one of the options: {options}")]
    NotAnOption { answer: String, options: String },

    #[error("Expected a number, got '{0}'")]
    NotANumber(String),

    #[error("Expected an integer, got {0}")]
    NotAnInteger(f64),

    #[error("Value {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange { value: f64, min: String, max: String },

    #[error("Selected {count} options, expected between {min} and {max}")]
    SelectionCount { count: usize, min: usize, max: usize },

    #[error("Malformed answer: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_an_option_display() {
        let error = ValidationError::NotAnOption {
            answer: "maybe".to_string(),
            options: "yes, no".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Answer 'maybe' is not one of the options: yes, no"
        );
    }
}
