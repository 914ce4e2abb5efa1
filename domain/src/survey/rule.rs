//! Branching rules
//!
//! A [`Rule`] is one edge of the survey's branching graph: when its condition
//! holds at `current_q`, the survey continues at `next_q`.

use super::error::SurveyError;
use super::expression::{EvalError, Expr};
use serde::{Deserialize, Serialize};

/// Where the survey goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextQuestion {
    Index(usize),
    EndOfSurvey,
}

impl NextQuestion {
    /// The question that naturally follows `current` in a survey of `count` questions
    pub fn after(current: usize, count: usize) -> Self {
        if current + 1 < count {
            NextQuestion::Index(current + 1)
        } else {
            NextQuestion::EndOfSurvey
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            NextQuestion::Index(i) => Some(*i),
            NextQuestion::EndOfSurvey => None,
        }
    }
}

impl std::fmt::Display for NextQuestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextQuestion::Index(i) => write!(f, "{}", i),
            NextQuestion::EndOfSurvey => write!(f, "EndOfSurvey"),
        }
    }
}

/// When a rule is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Checked before asking `current_q`; a match skips it
    Before,
    /// Checked after `current_q` is answered; picks the next question
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub current_q: usize,
    pub expression: Expr,
    /// Expression text as written
    pub source: String,
    pub next_q: NextQuestion,
    pub priority: i32,
    pub kind: RuleKind,
}

impl Rule {
    /// Priority of the implicit rule every question carries
    pub const DEFAULT_PRIORITY: i32 = -1;

    /// Build and validate a rule against the ordered question names.
    ///
    /// Fails on unparsable expressions, unknown or not-yet-answered question
    /// references, backward jumps and self loops.
    pub fn new(
        current_q: usize,
        source: &str,
        next_q: NextQuestion,
        priority: i32,
        kind: RuleKind,
        question_names: &[String],
    ) -> Result<Self, SurveyError> {
        let count = question_names.len();
        if current_q >= count {
            return Err(SurveyError::IndexOutOfRange {
                index: current_q,
                count,
            });
        }
        if priority <= Self::DEFAULT_PRIORITY {
            return Err(SurveyError::ReservedPriority { current_q, priority });
        }
        if let NextQuestion::Index(next) = next_q {
            if next >= count {
                return Err(SurveyError::IndexOutOfRange { index: next, count });
            }
            if next < current_q {
                return Err(SurveyError::BackwardJump {
                    current_q,
                    next_q: next,
                });
            }
            if next == current_q && kind == RuleKind::After {
                return Err(SurveyError::SelfLoop(current_q));
            }
        }

        let expression = Expr::parse(source).map_err(|error| SurveyError::Expression {
            source_text: source.to_string(),
            error,
        })?;

        for referenced in expression.question_references() {
            let referenced_q = question_names
                .iter()
                .position(|name| *name == referenced)
                .ok_or_else(|| SurveyError::UnknownQuestion(referenced.clone()))?;
            // After-rules may look at the question they hang off; before-rules may not
            let answered = match kind {
                RuleKind::After => referenced_q <= current_q,
                RuleKind::Before => referenced_q < current_q,
            };
            if !answered {
                return Err(SurveyError::ForwardReference {
                    current_q,
                    referenced,
                    referenced_q,
                });
            }
        }

        Ok(Self {
            current_q,
            expression,
            source: source.to_string(),
            next_q,
            priority,
            kind,
        })
    }

    /// The always-true fallthrough rule for `current_q`
    pub fn default_for(current_q: usize, count: usize) -> Self {
        Self {
            current_q,
            expression: Expr::always(),
            source: "True".to_string(),
            next_q: NextQuestion::after(current_q, count),
            priority: Self::DEFAULT_PRIORITY,
            kind: RuleKind::After,
        }
    }

    pub fn is_default(&self) -> bool {
        self.priority == Self::DEFAULT_PRIORITY
    }

    pub fn matches(&self, env: &dyn super::expression::Environment) -> Result<bool, EvalError> {
        self.expression.evaluate_bool(env)
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:?}] {} -> {} if {} (priority {})",
            self.kind, self.current_q, self.next_q, self.source, self.priority
        )
    }
}
