//! Prompt rendering port
//!
//! Turns a question into the prompt an agent answers. The default
//! [`TemplatePromptRenderer`] treats question text as a minijinja template
//! with `scenario`, `agent` and prior `answers` in scope.

use super::llm_gateway::Prompt;
use cohort_domain::{Agent, Question, Scenario, ValidationError, display_value};
use minijinja::{Environment, UndefinedBehavior, context};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Could not render question '{question}': {message}")]
pub struct RenderError {
    pub question: String,
    pub message: String,
}

/// One prior answer shown to the model
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub question_name: String,
    pub question_text: String,
    pub answer: Value,
}

pub trait PromptRenderer: Send + Sync {
    fn render(
        &self,
        question: &Question,
        scenario: &Scenario,
        agent: &Agent,
        memory: &[MemoryEntry],
    ) -> Result<Prompt, RenderError>;

    /// Follow-up prompt after `raw` failed validation
    fn corrective(
        &self,
        prompt: &Prompt,
        question: &Question,
        raw: &str,
        error: &ValidationError,
    ) -> Prompt {
        let user = format!(
            "{}\n\nYour previous answer was:\n{}\n\nThat answer was rejected: {}.\n{}",
            prompt.user,
            raw.trim(),
            error,
            question.kind.instructions()
        );
        Prompt::new(prompt.system.clone(), user)
    }
}

pub struct TemplatePromptRenderer {
    env: Environment<'static>,
}

impl Default for TemplatePromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplatePromptRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    fn memory_block(memory: &[MemoryEntry]) -> Option<String> {
        if memory.is_empty() {
            return None;
        }
        let mut out = String::from(
            "Before the question you are now answering, you already answered the following:",
        );
        for entry in memory {
            out.push_str(&format!(
                "\n\tQuestion: {}\n\tAnswer: {}",
                entry.question_text,
                display_value(&entry.answer)
            ));
        }
        Some(out)
    }
}

impl PromptRenderer for TemplatePromptRenderer {
    fn render(
        &self,
        question: &Question,
        scenario: &Scenario,
        agent: &Agent,
        memory: &[MemoryEntry],
    ) -> Result<Prompt, RenderError> {
        let answers: BTreeMap<&str, &Value> = memory
            .iter()
            .map(|m| (m.question_name.as_str(), &m.answer))
            .collect();
        let text = self
            .env
            .render_str(
                &question.text,
                context! {
                    scenario => scenario.fields(),
                    agent => &agent.traits,
                    answers => answers,
                },
            )
            .map_err(|e| RenderError {
                question: question.name.clone(),
                message: e.to_string(),
            })?;

        let mut user = text.trim().to_string();
        user.push_str("\n\n");
        user.push_str(&question.kind.instructions());
        if let Some(block) = Self::memory_block(memory) {
            user.push_str("\n\n");
            user.push_str(&block);
        }
        Ok(Prompt::new(agent.persona(), user))
    }
}
