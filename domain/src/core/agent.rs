//! Agent and scenario value objects
//!
//! An [`Agent`] is the simulated respondent; a [`Scenario`] is the set of
//! values substituted into question text for one run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A simulated respondent described by free-form traits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Persona traits (e.g. `age = 42`, `occupation = "nurse"`)
    #[serde(default)]
    pub traits: BTreeMap<String, Value>,
    /// Extra instruction prepended to the persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.traits.get(key)
    }

    /// Label used in logs: the name, or `agent` when anonymous
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("agent")
    }

    /// Persona text used as the system prompt
    pub fn persona(&self) -> String {
        let mut out = String::new();
        if let Some(instruction) = &self.instruction {
            out.push_str(instruction.trim());
            out.push_str("\n\n");
        }
        out.push_str("You are answering questions as if you were a human. Do not break character.");
        if !self.traits.is_empty() {
            out.push_str("\nYour traits:");
            for (key, value) in &self.traits {
                out.push_str(&format!("\n- {}: {}", key, display_value(value)));
            }
        }
        out
    }
}

/// Values substituted into question templates for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario(pub BTreeMap<String, Value>);

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl From<BTreeMap<String, Value>> for Scenario {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }
}

/// Render a JSON value for prompts: strings unquoted, everything else as JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_lists_traits_sorted() {
        let agent = Agent::named("ann")
            .with_trait("occupation", "nurse")
            .with_trait("age", 42);
        let persona = agent.persona();
        let age = persona.find("- age: 42").unwrap();
        let occupation = persona.find("- occupation: nurse").unwrap();
        assert!(age < occupation);
    }

    #[test]
    fn test_persona_includes_instruction_first() {
        let agent = Agent::new().with_instruction("Be terse.");
        assert!(agent.persona().starts_with("Be terse."));
    }

    #[test]
    fn test_label_defaults() {
        assert_eq!(Agent::new().label(), "agent");
        assert_eq!(Agent::named("bob").label(), "bob");
    }

    #[test]
    fn test_scenario_roundtrip_is_transparent() {
        let scenario = Scenario::new().with("city", "Paris");
        let json = serde_json::to_string(&scenario).unwrap();
        assert_eq!(json, r#"{"city":"Paris"}"#);
    }
}
