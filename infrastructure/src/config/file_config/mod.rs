//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted to application types on demand.

mod logging;
mod models;
mod run;
mod services;

pub use logging::FileLoggingConfig;
pub use models::FileModelConfig;
pub use run::{FileRetryConfig, FileRunConfig};
pub use services::FileServiceLimits;

use cohort_application::{RunParams, validate_models};
use cohort_domain::{ConfigIssue, ConfigIssueCode, LanguageModel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Concurrency, iterations, timeouts and retries
    pub run: FileRunConfig,
    /// Models every interview is run against
    pub models: Vec<FileModelConfig>,
    /// Per-service rate limit overrides
    pub services: BTreeMap<String, FileServiceLimits>,
    /// Event logging
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    pub fn run_params(&self) -> RunParams {
        self.run.to_run_params()
    }

    /// Models that converted cleanly; see [`validate`](Self::validate) for the rest
    pub fn language_models(&self) -> Vec<LanguageModel> {
        self.models
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.to_language_model(i).0)
            .collect()
    }

    /// Validate the entire configuration, returning all detected issues.
    ///
    /// It checks:
    /// 1. Run parameters (zero concurrency, zero iterations, zero timeout)
    /// 2. Model entries (empty ids, bad rates, duplicates)
    /// 3. Service overrides (bad rates, services no model uses)
    ///
    /// An empty model list is not reported here; running without models
    /// fails when the job starts.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.run_params().validate();

        let mut models = Vec::new();
        for (i, entry) in self.models.iter().enumerate() {
            let (model, entry_issues) = entry.to_language_model(i);
            issues.extend(entry_issues);
            models.extend(model);
        }
        if !models.is_empty() {
            issues.extend(validate_models(&models));
        }

        let used: BTreeSet<&str> = models.iter().map(|m| m.service.as_str()).collect();
        for (service, limits) in &self.services {
            for (field, value) in [("rpm", limits.rpm), ("tpm", limits.tpm)] {
                if value.is_nan() || value < 0.0 {
                    issues.push(ConfigIssue::error(
                        ConfigIssueCode::InvalidRateLimit,
                        format!("services.{}.{}: must be a non-negative number", service, field),
                    ));
                }
            }
            if !used.contains(service.as_str()) {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::UnknownServiceOverride,
                    format!("services.{}: no configured model uses this service", service),
                ));
            }
        }

        issues
    }
}
