//! Question value object and the closed set of question kinds
//!
//! A [`Question`] knows two things about itself: how to tell the model what
//! shape of answer is expected ([`QuestionKind::instructions`]) and how to
//! turn raw model output into a typed answer ([`QuestionKind::validate`]).

use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected answer shape of a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Any non-empty text
    FreeText,
    /// Exactly one of `options`
    MultipleChoice { options: Vec<String> },
    /// A subset of `options`
    Checkbox {
        options: Vec<String>,
        #[serde(default)]
        min_selections: Option<usize>,
        #[serde(default)]
        max_selections: Option<usize>,
    },
    /// A number, optionally bounded and/or integral
    Numerical {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        integer: bool,
    },
    /// `yes` or `no`
    YesNo,
}

impl QuestionKind {
    /// Instructions appended to the prompt describing the expected answer
    pub fn instructions(&self) -> String {
        match self {
            QuestionKind::FreeText => "Answer in free text.".to_string(),
            QuestionKind::MultipleChoice { options } => format!(
                "Choose exactly one of the following options and reply with the option text only:\n{}",
                bullet_list(options)
            ),
            QuestionKind::Checkbox {
                options,
                min_selections,
                max_selections,
            } => {
                let mut text = format!(
                    "Choose any of the following options. Reply with a JSON list of option texts:\n{}",
                    bullet_list(options)
                );
                if let Some(min) = min_selections {
                    text.push_str(&format!("\nSelect at least {} option(s).", min));
                }
                if let Some(max) = max_selections {
                    text.push_str(&format!("\nSelect at most {} option(s).", max));
                }
                text
            }
            QuestionKind::Numerical { min, max, integer } => {
                let mut text = if *integer {
                    "Reply with a single whole number.".to_string()
                } else {
                    "Reply with a single number.".to_string()
                };
                match (min, max) {
                    (Some(lo), Some(hi)) => {
                        text.push_str(&format!(" It must be between {} and {}.", lo, hi))
                    }
                    (Some(lo), None) => text.push_str(&format!(" It must be at least {}.", lo)),
                    (None, Some(hi)) => text.push_str(&format!(" It must be at most {}.", hi)),
                    (None, None) => {}
                }
                text
            }
            QuestionKind::YesNo => "Reply with 'yes' or 'no' only.".to_string(),
        }
    }

    /// Parse and validate raw model output into a typed answer
    pub fn validate(&self, raw: &str) -> Result<Value, ValidationError> {
        let candidate = extract_answer(raw)?;
        match self {
            QuestionKind::FreeText => match candidate {
                Value::String(s) if s.trim().is_empty() => Err(ValidationError::Empty),
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Null => Err(ValidationError::Empty),
                other => Ok(Value::String(other.to_string())),
            },
            QuestionKind::MultipleChoice { options } => {
                match_option(options, &candidate).map(Value::String)
            }
            QuestionKind::Checkbox {
                options,
                min_selections,
                max_selections,
            } => {
                let picks = match candidate {
                    Value::Array(items) => items,
                    Value::String(s) => s
                        .split(',')
                        .map(|part| Value::String(part.trim().to_string()))
                        .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
                        .collect(),
                    other => vec![other],
                };
                let mut selected: Vec<String> = Vec::new();
                for pick in &picks {
                    let option = match_option(options, pick)?;
                    if !selected.contains(&option) {
                        selected.push(option);
                    }
                }
                let min = min_selections.unwrap_or(0);
                let max = max_selections.unwrap_or(options.len());
                if selected.len() < min || selected.len() > max {
                    return Err(ValidationError::SelectionCount {
                        count: selected.len(),
                        min,
                        max,
                    });
                }
                Ok(Value::Array(selected.into_iter().map(Value::String).collect()))
            }
            QuestionKind::Numerical { min, max, integer } => {
                let number = match &candidate {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|n| n.is_finite())
                .ok_or_else(|| ValidationError::NotANumber(display(&candidate)))?;

                if *integer && number.fract() != 0.0 {
                    return Err(ValidationError::NotAnInteger(number));
                }
                let below = min.is_some_and(|lo| number < lo);
                let above = max.is_some_and(|hi| number > hi);
                if below || above {
                    return Err(ValidationError::OutOfRange {
                        value: number,
                        min: min.map_or_else(|| "-inf".to_string(), |v| v.to_string()),
                        max: max.map_or_else(|| "inf".to_string(), |v| v.to_string()),
                    });
                }
                if *integer {
                    Ok(Value::from(number as i64))
                } else {
                    Ok(serde_json::Number::from_f64(number)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                }
            }
            QuestionKind::YesNo => {
                let text = match &candidate {
                    Value::Bool(true) => "yes".to_string(),
                    Value::Bool(false) => "no".to_string(),
                    other => display(other).trim().trim_end_matches('.').to_lowercase(),
                };
                match text.as_str() {
                    "yes" | "y" => Ok(Value::String("yes".to_string())),
                    "no" | "n" => Ok(Value::String("no".to_string())),
                    _ => Err(ValidationError::NotAnOption {
                        answer: text,
                        options: "yes, no".to_string(),
                    }),
                }
            }
        }
    }
}

/// A single survey question (Value Object)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier used in rule expressions and answer maps
    pub name: String,
    /// Question text; may reference `{{ scenario.key }}` placeholders
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn new(name: impl Into<String>, text: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind,
        }
    }

    pub fn free_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, QuestionKind::FreeText)
    }

    pub fn yes_no(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, QuestionKind::YesNo)
    }

    pub fn multiple_choice<S: Into<String>>(
        name: impl Into<String>,
        text: impl Into<String>,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            text,
            QuestionKind::MultipleChoice {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn numerical(
        name: impl Into<String>,
        text: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self::new(
            name,
            text,
            QuestionKind::Numerical {
                min,
                max,
                integer: false,
            },
        )
    }

    pub fn validate(&self, raw: &str) -> Result<Value, ValidationError> {
        self.kind.validate(raw)
    }
}

/// Check that a question name can be used as an expression variable
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(
            name,
            "and" | "or" | "not" | "in" | "true" | "false" | "True" | "False" | "null" | "None"
                | "scenario" | "agent"
        )
}

fn bullet_list(options: &[String]) -> String {
    options
        .iter()
        .map(|o| format!("- {}", o))
        .collect::<Vec<_>>()
        .join("\n")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strip code fences and pull the answer out of JSON if the model sent any
fn extract_answer(raw: &str) -> Result<Value, ValidationError> {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.trim_start_matches("json");
        text = inner.trim_end().trim_end_matches("```").trim();
    }
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => map.remove("answer").ok_or_else(|| {
            ValidationError::Malformed("JSON object without 'answer' key".to_string())
        }),
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(text.to_string())),
    }
}

fn match_option(options: &[String], candidate: &Value) -> Result<String, ValidationError> {
    let text = display(candidate);
    let wanted = text.trim().trim_end_matches('.').to_lowercase();
    if let Some(option) = options.iter().find(|o| o.trim().to_lowercase() == wanted) {
        return Ok(option.clone());
    }
    // Fall back to a zero-based option index
    if let Some(index) = candidate.as_u64().or_else(|| wanted.parse::<u64>().ok())
        && let Some(option) = options.get(index as usize)
    {
        return Ok(option.clone());
    }
    Err(ValidationError::NotAnOption {
        answer: text,
        options: options.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice() -> QuestionKind {
        QuestionKind::MultipleChoice {
            options: vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()],
        }
    }

    #[test]
    fn test_multiple_choice_is_case_insensitive() {
        assert_eq!(choice().validate("  green. ").unwrap(), json!("Green"));
    }

    #[test]
    fn test_multiple_choice_accepts_json_answer_object() {
        assert_eq!(choice().validate(r#"{"answer": "Blue"}"#).unwrap(), json!("Blue"));
    }

    #[test]
    fn test_multiple_choice_accepts_index() {
        assert_eq!(choice().validate("0").unwrap(), json!("Red"));
    }

    #[test]
    fn test_multiple_choice_rejects_unknown() {
        let err = choice().validate("Purple").unwrap_err();
        assert!(matches!(err, ValidationError::NotAnOption { .. }));
    }

    #[test]
    fn test_yes_no_normalizes() {
        assert_eq!(QuestionKind::YesNo.validate("No.").unwrap(), json!("no"));
        assert_eq!(QuestionKind::YesNo.validate("true").unwrap(), json!("yes"));
        assert!(QuestionKind::YesNo.validate("perhaps").is_err());
    }

    #[test]
    fn test_numerical_range() {
        let kind = QuestionKind::Numerical {
            min: Some(0.0),
            max: Some(10.0),
            integer: true,
        };
        assert_eq!(kind.validate("7").unwrap(), json!(7));
        assert!(matches!(
            kind.validate("11"),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            kind.validate("2.5"),
            Err(ValidationError::NotAnInteger(_))
        ));
        assert!(matches!(
            kind.validate("lots"),
            Err(ValidationError::NotANumber(_))
        ));
    }

    #[test]
    fn test_checkbox_selection_bounds() {
        let kind = QuestionKind::Checkbox {
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            min_selections: Some(1),
            max_selections: Some(2),
        };
        assert_eq!(kind.validate(r#"["a", "c"]"#).unwrap(), json!(["a", "c"]));
        assert_eq!(kind.validate("b, a").unwrap(), json!(["b", "a"]));
        assert!(matches!(
            kind.validate(r#"["a", "b", "c"]"#),
            Err(ValidationError::SelectionCount { count: 3, .. })
        ));
    }

    #[test]
    fn test_free_text_strips_code_fence() {
        let raw = "```json\n{\"answer\": \"hello\"}\n```";
        assert_eq!(QuestionKind::FreeText.validate(raw).unwrap(), json!("hello"));
        assert_eq!(QuestionKind::FreeText.validate("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("q1"));
        assert!(is_valid_name("_likes_tea"));
        assert!(!is_valid_name("1q"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("and"));
        assert!(!is_valid_name("scenario"));
    }

    #[test]
    fn test_question_kind_serde_tag() {
        let q = Question::yes_no("q0", "Do you drink tea?");
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], json!("yes_no"));
        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }
}
