//! Variable resolution for rule conditions during an interview

use crate::core::agent::{Agent, Scenario};
use crate::survey::expression::{AGENT_PREFIX, Environment, SCENARIO_PREFIX};
use serde_json::Value;
use std::collections::BTreeMap;

/// Answers so far, plus the scenario and agent of the interview.
///
/// Resolves `q`, `q.answer`, `scenario.key[.nested]` and `agent.key[.nested]`.
pub struct AnswerEnvironment<'a> {
    answers: &'a BTreeMap<String, Value>,
    scenario: &'a Scenario,
    agent: &'a Agent,
}

impl<'a> AnswerEnvironment<'a> {
    pub fn new(
        answers: &'a BTreeMap<String, Value>,
        scenario: &'a Scenario,
        agent: &'a Agent,
    ) -> Self {
        Self {
            answers,
            scenario,
            agent,
        }
    }
}

fn descend<'v>(mut value: &'v Value, rest: &[String]) -> Option<&'v Value> {
    for key in rest {
        value = value.get(key.as_str())?;
    }
    Some(value)
}

impl Environment for AnswerEnvironment<'_> {
    fn lookup(&self, path: &[String]) -> Option<&Value> {
        let (head, rest) = path.split_first()?;
        match head.as_str() {
            SCENARIO_PREFIX => {
                let (key, rest) = rest.split_first()?;
                descend(self.scenario.get(key)?, rest)
            }
            AGENT_PREFIX => {
                let (key, rest) = rest.split_first()?;
                descend(self.agent.get(key)?, rest)
            }
            question => {
                let answer = self.answers.get(question)?;
                match rest {
                    [] => Some(answer),
                    [field] if field == "answer" => Some(answer),
                    _ => None,
                }
            }
        }
    }
}
