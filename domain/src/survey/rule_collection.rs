//! Rule collection: the survey's branching decision table
//!
//! Every question starts with an implicit default after-rule (priority -1,
//! always true) that routes to the following question, so a decision at a
//! valid node always has at least one candidate. Explicit rules sit on top of
//! it; the highest priority rule whose condition holds wins.

use super::error::SurveyError;
use super::expression::{EvalError, Environment};
use super::rule::{NextQuestion, Rule, RuleKind};

/// Outcome of evaluating one node
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecision {
    pub next: NextQuestion,
    /// Priority of the winning rule
    pub priority: i32,
    /// Rules whose condition could not be evaluated (treated as non-matching)
    pub eval_errors: Vec<(i32, EvalError)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleCollection {
    num_questions: usize,
    rules: Vec<Rule>,
}

impl RuleCollection {
    /// Collection holding only the default rule for each of `num_questions`
    pub fn new(num_questions: usize) -> Self {
        Self {
            num_questions,
            rules: (0..num_questions)
                .map(|q| Rule::default_for(q, num_questions))
                .collect(),
        }
    }

    pub fn num_questions(&self) -> usize {
        self.num_questions
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Add an explicit rule.
    ///
    /// Two non-default rules of the same kind at the same question may not
    /// share a priority: precedence must be stated, not left to insertion order.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), SurveyError> {
        if rule.current_q >= self.num_questions {
            return Err(SurveyError::IndexOutOfRange {
                index: rule.current_q,
                count: self.num_questions,
            });
        }
        let tie = self.rules_at(rule.current_q, rule.kind).any(|existing| {
            !existing.is_default() && existing.priority == rule.priority
        });
        if tie {
            return Err(SurveyError::PriorityTie {
                current_q: rule.current_q,
                priority: rule.priority,
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules_at(&self, q: usize, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |rule| rule.current_q == q && rule.kind == kind)
    }

    /// Lowest priority not yet used by an explicit rule of `kind` at `q`
    pub fn next_free_priority(&self, q: usize, kind: RuleKind) -> i32 {
        self.rules_at(q, kind)
            .filter(|rule| !rule.is_default())
            .map(|rule| rule.priority + 1)
            .max()
            .unwrap_or(0)
    }

    fn decide(
        &self,
        q: usize,
        kind: RuleKind,
        env: &dyn Environment,
    ) -> Option<RuleDecision> {
        let mut best: Option<&Rule> = None;
        let mut eval_errors = Vec::new();
        for rule in self.rules_at(q, kind) {
            match rule.matches(env) {
                Ok(true) => {
                    if best.is_none_or(|b| rule.priority > b.priority) {
                        best = Some(rule);
                    }
                }
                Ok(false) => {}
                Err(error) => eval_errors.push((rule.priority, error)),
            }
        }
        best.map(|rule| RuleDecision {
            next: rule.next_q,
            priority: rule.priority,
            eval_errors,
        })
    }

    /// Evaluate the after-rules of `q_now` and report the full decision
    pub fn decide_next(
        &self,
        q_now: usize,
        env: &dyn Environment,
    ) -> Result<RuleDecision, SurveyError> {
        if self.rules_at(q_now, RuleKind::After).next().is_none() {
            return Err(SurveyError::NoRuleAtNode(q_now));
        }
        self.decide(q_now, RuleKind::After, env)
            .ok_or(SurveyError::NoRuleAtNode(q_now))
    }

    /// The question that follows `q_now` given the answers so far
    pub fn next_question(
        &self,
        q_now: usize,
        env: &dyn Environment,
    ) -> Result<NextQuestion, SurveyError> {
        self.decide_next(q_now, env).map(|decision| decision.next)
    }

    /// Evaluate the before-rules of `q`.
    ///
    /// Returns the jump target when a skip rule fires; `None` means ask `q`.
    pub fn skip_before(&self, q: usize, env: &dyn Environment) -> Option<RuleDecision> {
        self.decide(q, RuleKind::Before, env)
            .filter(|decision| decision.next != NextQuestion::Index(q))
    }
}
