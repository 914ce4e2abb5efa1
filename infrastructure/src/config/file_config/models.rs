//! Model list from TOML (`[[models]]` array)

use cohort_domain::{ConfigIssue, ConfigIssueCode, LanguageModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_rpm() -> f64 {
    100.0
}

fn default_tpm() -> f64 {
    2_000_000.0
}

/// One model entry from TOML
///
/// # Example
///
/// ```toml
/// [[models]]
/// model = "gpt-4o"
/// service = "openai"
/// rpm = 500
/// tpm = 300000
/// parameters = { temperature = 0.5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileModelConfig {
    pub model: String,
    pub service: String,
    #[serde(default = "default_rpm")]
    pub rpm: f64,
    #[serde(default = "default_tpm")]
    pub tpm: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl FileModelConfig {
    /// Convert to the domain model, collecting issues for empty identifiers
    pub fn to_language_model(&self, position: usize) -> (Option<LanguageModel>, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        for (field, value) in [("model", &self.model), ("service", &self.service)] {
            if value.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyModelId,
                    format!("models[{}].{}: cannot be empty", position, field),
                ));
            }
        }
        if !issues.is_empty() {
            return (None, issues);
        }
        let mut model =
            LanguageModel::new(self.model.trim(), self.service.trim(), self.rpm, self.tpm);
        model.parameters = self.parameters.clone();
        (Some(model), issues)
    }
}
