//! Survey entity: ordered questions plus branching rules and a memory plan

use super::error::SurveyError;
use super::memory::MemoryPlan;
use super::rule::{NextQuestion, Rule, RuleKind};
use super::rule_collection::RuleCollection;
use crate::core::question::{Question, is_valid_name};
use std::collections::HashSet;

/// Destination of a rule, by question name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Question(String),
    EndOfSurvey,
}

impl Target {
    pub fn question(name: impl Into<String>) -> Self {
        Target::Question(name.into())
    }
}

/// Ordered questions with their branching rules and memory plan.
///
/// Built once and shared read-only by every interview of a run.
///
/// ```
/// use cohort_domain::{Question, Survey, Target};
///
/// let survey = Survey::new(vec![
///     Question::yes_no("drinks_tea", "Do you drink tea?"),
///     Question::free_text("favorite_tea", "What is your favorite tea?"),
///     Question::free_text("other", "Anything else?"),
/// ])
/// .unwrap()
/// .add_rule("drinks_tea", "drinks_tea == 'no'", Target::question("other"), 1)
/// .unwrap();
///
/// assert_eq!(survey.rules().rules().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Survey {
    questions: Vec<Question>,
    names: Vec<String>,
    rules: RuleCollection,
    memory: MemoryPlan,
}

impl Survey {
    pub fn new(questions: Vec<Question>) -> Result<Self, SurveyError> {
        if questions.is_empty() {
            return Err(SurveyError::NoQuestions);
        }
        let mut seen = HashSet::new();
        for question in &questions {
            if !is_valid_name(&question.name) {
                return Err(SurveyError::InvalidQuestionName(question.name.clone()));
            }
            if !seen.insert(question.name.as_str()) {
                return Err(SurveyError::DuplicateQuestionName(question.name.clone()));
            }
        }
        let names = questions.iter().map(|q| q.name.clone()).collect();
        let rules = RuleCollection::new(questions.len());
        Ok(Self {
            questions,
            names,
            rules,
            memory: MemoryPlan::new(),
        })
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn question_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn rules(&self) -> &RuleCollection {
        &self.rules
    }

    pub fn memory(&self) -> &MemoryPlan {
        &self.memory
    }

    pub fn index_of(&self, name: &str) -> Result<usize, SurveyError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SurveyError::UnknownQuestion(name.to_string()))
    }

    fn resolve(&self, target: &Target) -> Result<NextQuestion, SurveyError> {
        match target {
            Target::Question(name) => self.index_of(name).map(NextQuestion::Index),
            Target::EndOfSurvey => Ok(NextQuestion::EndOfSurvey),
        }
    }

    fn push_rule(
        mut self,
        question: &str,
        expression: &str,
        next: NextQuestion,
        priority: i32,
        kind: RuleKind,
    ) -> Result<Self, SurveyError> {
        let current = self.index_of(question)?;
        let rule = Rule::new(current, expression, next, priority, kind, &self.names)?;
        self.rules.add_rule(rule)?;
        Ok(self)
    }

    /// Route to `target` after `question` when `expression` holds
    pub fn add_rule(
        self,
        question: &str,
        expression: &str,
        target: Target,
        priority: i32,
    ) -> Result<Self, SurveyError> {
        let next = self.resolve(&target)?;
        self.push_rule(question, expression, next, priority, RuleKind::After)
    }

    /// Jump to `target` instead of asking `question` when `expression` holds
    pub fn add_before_rule(
        self,
        question: &str,
        expression: &str,
        target: Target,
        priority: i32,
    ) -> Result<Self, SurveyError> {
        let next = self.resolve(&target)?;
        self.push_rule(question, expression, next, priority, RuleKind::Before)
    }

    /// Skip `question` when `expression` holds
    pub fn add_skip_rule(self, question: &str, expression: &str) -> Result<Self, SurveyError> {
        let current = self.index_of(question)?;
        let next = NextQuestion::after(current, self.len());
        let priority = self.rules.next_free_priority(current, RuleKind::Before);
        self.push_rule(question, expression, next, priority, RuleKind::Before)
    }

    /// End the survey after `question` when `expression` holds
    pub fn add_stop_rule(self, question: &str, expression: &str) -> Result<Self, SurveyError> {
        let current = self.index_of(question)?;
        let priority = self.rules.next_free_priority(current, RuleKind::After);
        self.push_rule(question, expression, NextQuestion::EndOfSurvey, priority, RuleKind::After)
    }

    pub fn set_full_memory(mut self) -> Self {
        self.memory = MemoryPlan::full_memory(&self.names);
        self
    }

    pub fn set_lagged_memory(mut self, lags: usize) -> Self {
        self.memory = MemoryPlan::lagged_memory(&self.names, lags);
        self
    }

    pub fn add_targeted_memory(mut self, focal: &str, prior: &str) -> Result<Self, SurveyError> {
        self.memory.add_single_memory(&self.names, focal, prior)?;
        Ok(self)
    }

    pub fn add_memory_collection(
        mut self,
        focal: &str,
        priors: &[&str],
    ) -> Result<Self, SurveyError> {
        self.memory.add_memory_collection(&self.names, focal, priors)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::expression::MapEnvironment;
    use serde_json::json;

    fn three() -> Vec<Question> {
        vec![
            Question::yes_no("q1", "First?"),
            Question::free_text("q2", "Second?"),
            Question::free_text("q3", "Third?"),
        ]
    }

    #[test]
    fn test_rejects_duplicates_and_bad_names() {
        let dup = vec![Question::yes_no("a", "?"), Question::yes_no("a", "?")];
        assert_eq!(
            Survey::new(dup).unwrap_err(),
            SurveyError::DuplicateQuestionName("a".to_string())
        );
        let bad = vec![Question::yes_no("two words", "?")];
        assert!(matches!(
            Survey::new(bad),
            Err(SurveyError::InvalidQuestionName(_))
        ));
        assert_eq!(Survey::new(vec![]).unwrap_err(), SurveyError::NoQuestions);
    }

    #[test]
    fn test_add_rule_by_name() {
        let survey = Survey::new(three())
            .unwrap()
            .add_rule("q1", "q1 == 'no'", Target::question("q3"), 1)
            .unwrap();
        let env = MapEnvironment::new().with("q1", json!("no"));
        assert_eq!(
            survey.rules().next_question(0, &env).unwrap(),
            NextQuestion::Index(2)
        );
    }

    #[test]
    fn test_backward_target_rejected() {
        let err = Survey::new(three())
            .unwrap()
            .add_rule("q3", "q3 == 'x'", Target::question("q1"), 1)
            .unwrap_err();
        assert_eq!(err, SurveyError::BackwardJump { current_q: 2, next_q: 0 });
    }

    #[test]
    fn test_skip_and_stop_rules_pick_free_priorities() {
        let survey = Survey::new(three())
            .unwrap()
            .add_skip_rule("q2", "q1 == 'no'")
            .unwrap()
            .add_skip_rule("q2", "q1 == 'maybe'")
            .unwrap()
            .add_stop_rule("q1", "q1 == 'stop'")
            .unwrap();
        let before: Vec<_> = survey
            .rules()
            .rules_at(1, RuleKind::Before)
            .map(|r| r.priority)
            .collect();
        assert_eq!(before, vec![0, 1]);

        let env = MapEnvironment::new().with("q1", json!("stop"));
        assert_eq!(
            survey.rules().next_question(0, &env).unwrap(),
            NextQuestion::EndOfSurvey
        );
    }

    #[test]
    fn test_memory_builders() {
        let survey = Survey::new(three()).unwrap().set_full_memory();
        assert_eq!(survey.memory().visible_to("q3"), ["q1", "q2"]);

        let survey = Survey::new(three())
            .unwrap()
            .add_targeted_memory("q3", "q1")
            .unwrap();
        assert_eq!(survey.memory().visible_to("q3"), ["q1"]);
        assert!(survey.memory().visible_to("q2").is_empty());
    }
}
