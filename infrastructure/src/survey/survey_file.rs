//! TOML survey file format
//!
//! ```toml
//! [[questions]]
//! name = "drinks_tea"
//! text = "Do you drink tea?"
//! type = "yes_no"
//!
//! [[questions]]
//! name = "favorite"
//! text = "Which tea do you like best in {{ scenario.season }}?"
//! type = "multiple_choice"
//! options = ["green", "black", "oolong"]
//!
//! [[rules]]
//! question = "drinks_tea"
//! expression = "drinks_tea == 'no'"
//! target = "end"
//! priority = 1
//!
//! [memory]
//! mode = "full"
//!
//! [[agents]]
//! name = "ann"
//! traits = { age = 34 }
//!
//! [[scenarios]]
//! season = "winter"
//! ```

use cohort_domain::{Agent, Question, RuleKind, Scenario, Survey, SurveyError, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rule target naming the end of the survey
pub const END_TARGET: &str = "end";

#[derive(Error, Debug)]
pub enum SurveyFileError {
    #[error("Could not read survey file {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Malformed survey file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid survey: {0}")]
    Survey(#[from] SurveyError),
}

/// A branching rule entry (`[[rules]]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRule {
    pub question: String,
    pub expression: String,
    /// Question name, or `"end"`
    pub target: String,
    /// Omitted: the next free priority at that question
    #[serde(default)]
    pub priority: Option<i32>,
    /// Evaluated before the question is asked instead of after
    #[serde(default)]
    pub before: bool,
}

/// A skip entry (`[[skip_rules]]`): skip `question` when `expression` holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSkipRule {
    pub question: String,
    pub expression: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Only explicit `targets`
    #[default]
    None,
    /// Every earlier question
    Full,
    /// The `lags` questions immediately before
    Lagged,
}

/// Memory plan (`[memory]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMemory {
    pub mode: MemoryMode,
    pub lags: usize,
    /// Focal question → earlier questions it sees, added on top of `mode`
    pub targets: BTreeMap<String, Vec<String>>,
}

impl Default for FileMemory {
    fn default() -> Self {
        Self {
            mode: MemoryMode::None,
            lags: 1,
            targets: BTreeMap::new(),
        }
    }
}

/// Agent entry (`[[agents]]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAgent {
    pub name: Option<String>,
    pub instruction: Option<String>,
    pub traits: BTreeMap<String, serde_json::Value>,
}

impl From<FileAgent> for Agent {
    fn from(file: FileAgent) -> Self {
        Agent {
            name: file.name,
            traits: file.traits,
            instruction: file.instruction,
        }
    }
}

/// Raw survey file (exact TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyFile {
    pub questions: Vec<Question>,
    pub rules: Vec<FileRule>,
    pub skip_rules: Vec<FileSkipRule>,
    pub memory: FileMemory,
    pub agents: Vec<FileAgent>,
    pub scenarios: Vec<Scenario>,
}

/// Validated domain values built from a survey file
#[derive(Debug, Clone)]
pub struct SurveyParts {
    pub survey: Survey,
    pub agents: Vec<Agent>,
    pub scenarios: Vec<Scenario>,
}

impl SurveyFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SurveyFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| SurveyFileError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SurveyFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Build the survey, checking every rule and memory reference
    pub fn into_parts(self) -> Result<SurveyParts, SurveyFileError> {
        let mut survey = Survey::new(self.questions)?;

        survey = match self.memory.mode {
            MemoryMode::None => survey,
            MemoryMode::Full => survey.set_full_memory(),
            MemoryMode::Lagged => survey.set_lagged_memory(self.memory.lags),
        };
        for (focal, priors) in &self.memory.targets {
            let priors: Vec<&str> = priors.iter().map(String::as_str).collect();
            survey = survey.add_memory_collection(focal, &priors)?;
        }

        for rule in self.rules {
            let target = if rule.target == END_TARGET {
                Target::EndOfSurvey
            } else {
                Target::Question(rule.target)
            };
            let kind = if rule.before {
                RuleKind::Before
            } else {
                RuleKind::After
            };
            let priority = match rule.priority {
                Some(priority) => priority,
                None => {
                    let current = survey.index_of(&rule.question)?;
                    survey.rules().next_free_priority(current, kind)
                }
            };
            survey = if rule.before {
                survey.add_before_rule(&rule.question, &rule.expression, target, priority)?
            } else {
                survey.add_rule(&rule.question, &rule.expression, target, priority)?
            };
        }

        for skip in self.skip_rules {
            survey = survey.add_skip_rule(&skip.question, &skip.expression)?;
        }

        Ok(SurveyParts {
            survey,
            agents: self.agents.into_iter().map(Agent::from).collect(),
            scenarios: self.scenarios,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_domain::{NextQuestion, QuestionKind};
    use serde_json::json;

    const TEA: &str = r#"
[[questions]]
name = "drinks_tea"
text = "Do you drink tea?"
type = "yes_no"

[[questions]]
name = "favorite"
text = "Which tea in {{ scenario.season }}?"
type = "multiple_choice"
options = ["green", "black"]

[[questions]]
name = "cups"
text = "How many cups a day?"
type = "numerical"
min = 0
integer = true

[[rules]]
question = "drinks_tea"
expression = "drinks_tea == 'no'"
target = "end"
priority = 1

[[skip_rules]]
question = "favorite"
expression = "scenario.season == 'summer'"

[memory]
mode = "lagged"
lags = 1
targets = { cups = ["drinks_tea"] }

[[agents]]
name = "ann"
instruction = "Answer briefly."
traits = { age = 34 }

[[scenarios]]
season = "winter"

[[scenarios]]
season = "summer"
"#;

    #[test]
    fn test_parse_full_file() {
        let parts = SurveyFile::parse(TEA).unwrap().into_parts().unwrap();
        let survey = &parts.survey;
        assert_eq!(survey.len(), 3);
        assert_eq!(
            survey.question(2).unwrap().kind,
            QuestionKind::Numerical {
                min: Some(0.0),
                max: None,
                integer: true
            }
        );
        let stop = survey
            .rules()
            .rules_at(0, RuleKind::After)
            .find(|r| r.priority == 1)
            .unwrap();
        assert_eq!(stop.next_q, NextQuestion::EndOfSurvey);
        assert_eq!(survey.rules().rules_at(1, RuleKind::Before).count(), 1);
        assert_eq!(survey.memory().visible_to("cups"), ["drinks_tea", "favorite"]);

        assert_eq!(parts.agents[0].label(), "ann");
        assert_eq!(parts.agents[0].get("age"), Some(&json!(34)));
        assert_eq!(parts.scenarios.len(), 2);
        assert_eq!(parts.scenarios[1].get("season"), Some(&json!("summer")));
    }

    #[test]
    fn test_rule_without_priority_gets_next_free() {
        let text = r#"
[[questions]]
name = "a"
text = "A?"
type = "free_text"

[[questions]]
name = "b"
text = "B?"
type = "free_text"

[[rules]]
question = "a"
expression = "a == 'x'"
target = "end"

[[rules]]
question = "a"
expression = "a == 'y'"
target = "end"
"#;
        let parts = SurveyFile::parse(text).unwrap().into_parts().unwrap();
        let mut priorities: Vec<_> = parts
            .survey
            .rules()
            .rules_at(0, RuleKind::After)
            .map(|r| r.priority)
            .collect();
        priorities.sort();
        assert_eq!(priorities, vec![-1, 0, 1]);
    }

    #[test]
    fn test_unknown_rule_target_is_an_error() {
        let text = r#"
[[questions]]
name = "a"
text = "A?"
type = "free_text"

[[rules]]
question = "a"
expression = "a == 'x'"
target = "nowhere"
priority = 0
"#;
        let err = SurveyFile::parse(text).unwrap().into_parts().unwrap_err();
        assert!(matches!(
            err,
            SurveyFileError::Survey(SurveyError::UnknownQuestion(ref name)) if name == "nowhere"
        ));
    }

    #[test]
    fn test_unknown_question_type_is_a_parse_error() {
        let text = "[[questions]]\nname = \"a\"\ntext = \"A?\"\ntype = \"essay\"\n";
        assert!(matches!(SurveyFile::parse(text), Err(SurveyFileError::Parse(_))));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = SurveyFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));

        let present = dir.path().join("survey.toml");
        std::fs::write(&present, TEA).unwrap();
        assert_eq!(SurveyFile::load(&present).unwrap().questions.len(), 3);
    }
}
