//! Jobs use case
//!
//! Top-level orchestration: validate the run, size a [`BucketCollection`]
//! from the model list (plus key-lookup overrides), drive the
//! [`AsyncInterviewRunner`] and fold everything into [`Results`].

use crate::config::RunParams;
use crate::ports::key_lookup::{KeyLookup, NoKeyLookup};
use crate::ports::llm_gateway::LlmGateway;
use crate::ports::progress::InterviewObserver;
use crate::ports::prompt_renderer::PromptRenderer;
use crate::ports::response_cache::ResponseCache;
use crate::rate_limit::BucketCollection;
use crate::use_cases::run_interviews::{AsyncInterviewRunner, RunnerError};
use crate::use_cases::shared::InterviewServices;
use cohort_domain::{
    Agent, ConfigIssue, ConfigIssueCode, LanguageModel, Results, Scenario, Survey,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can occur while running a job
#[derive(Error, Debug)]
pub enum JobsError {
    #[error("No models configured")]
    NoModels,

    #[error("Invalid run configuration: {}", summarize(.0))]
    InvalidConfig(Vec<ConfigIssue>),

    /// The run stopped early; `partial` holds everything that finished
    #[error("{error}")]
    Interrupted {
        error: RunnerError,
        partial: Box<Results>,
    },
}

impl JobsError {
    pub fn partial(&self) -> Option<&Results> {
        match self {
            JobsError::Interrupted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

fn summarize(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Rate and identity checks on the configured models
pub fn validate_models(models: &[LanguageModel]) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    if models.is_empty() {
        issues.push(ConfigIssue::error(
            ConfigIssueCode::NoModels,
            "at least one model is required",
        ));
    }
    let mut seen = HashSet::new();
    for model in models {
        for (name, value) in [("rpm", model.rpm), ("tpm", model.tpm)] {
            if value.is_nan() || value < 0.0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidRateLimit,
                    format!("{model}: {name} must be a non-negative number, got {value}"),
                ));
            } else if value == 0.0 {
                issues.push(ConfigIssue::warning(
                    ConfigIssueCode::ZeroRateLimit,
                    format!("{model}: {name} is 0; requests will wait until max_bucket_wait"),
                ));
            }
        }
        if !seen.insert(model.to_string()) {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::DuplicateModel,
                format!("{model} is listed more than once; its interviews run twice"),
            ));
        }
    }
    issues
}

/// A survey run over agents × scenarios × models
pub struct Jobs {
    survey: Arc<Survey>,
    agents: Vec<Agent>,
    scenarios: Vec<Scenario>,
    models: Vec<LanguageModel>,
    params: RunParams,
    key_lookup: Arc<dyn KeyLookup>,
    services: InterviewServices,
}

impl Jobs {
    pub fn new(survey: Survey, models: Vec<LanguageModel>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            survey: Arc::new(survey),
            agents: Vec::new(),
            scenarios: Vec::new(),
            models,
            params: RunParams::default(),
            key_lookup: Arc::new(NoKeyLookup),
            services: InterviewServices::new(gateway, Arc::new(BucketCollection::new())),
        }
    }

    pub fn with_agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_params(mut self, params: RunParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_key_lookup(mut self, key_lookup: Arc<dyn KeyLookup>) -> Self {
        self.key_lookup = key_lookup;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.services = self.services.with_cache(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn InterviewObserver>) -> Self {
        self.services = self.services.with_observer(observer);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PromptRenderer>) -> Self {
        self.services = self.services.with_renderer(renderer);
        self
    }

    pub fn survey(&self) -> &Survey {
        &self.survey
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// Number of interviews a full run expands to
    pub fn interview_count(&self) -> usize {
        self.agents.len().max(1)
            * self.scenarios.len().max(1)
            * self.models.len()
            * self.params.n_iterations
    }

    /// All configuration issues, errors and warnings
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.params.validate();
        issues.extend(validate_models(&self.models));
        issues
    }

    /// One bucket pair per service, with key-lookup overrides applied
    pub fn build_bucket_collection(&self) -> BucketCollection {
        let buckets = if self.params.infinity_buckets {
            BucketCollection::infinity()
        } else {
            BucketCollection::new()
        };
        for model in &self.models {
            buckets.add_model(model);
        }
        let updated = buckets.update_from_key_lookup(self.key_lookup.as_ref());
        if !updated.is_empty() {
            debug!(services = ?updated, "Applied key lookup limits");
        }
        buckets
    }

    fn check(&self) -> Result<(), JobsError> {
        if self.models.is_empty() {
            return Err(JobsError::NoModels);
        }
        let issues = self.validate();
        for issue in issues.iter().filter(|i| !i.is_error()) {
            warn!("{}", issue);
        }
        if ConfigIssue::has_errors(&issues) {
            let errors = issues.into_iter().filter(ConfigIssue::is_error).collect();
            return Err(JobsError::InvalidConfig(errors));
        }
        Ok(())
    }

    async fn execute(
        &self,
        only: Option<Vec<usize>>,
        cancel: Option<CancellationToken>,
    ) -> Result<Results, JobsError> {
        self.check()?;

        let buckets = Arc::new(self.build_bucket_collection());
        let services = InterviewServices {
            buckets: Arc::clone(&buckets),
            ..self.services.clone()
        };
        let mut runner = AsyncInterviewRunner::new(
            Arc::clone(&self.survey),
            self.agents.clone(),
            self.scenarios.clone(),
            self.models.clone(),
            self.params.clone(),
            services,
        );
        if let Some(indices) = only {
            runner = runner.only(indices);
        }

        let (results, error) = runner.collect(cancel).await;
        let usage = results.total_usage();
        info!(
            completed = results.completed().len(),
            failed = results.failed().len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Job finished"
        );
        for snapshot in buckets.snapshot() {
            debug!(
                service = %snapshot.service,
                requests_per_sec = snapshot.requests.throughput,
                tokens_per_sec = snapshot.tokens.throughput,
                "Bucket throughput"
            );
        }

        match error {
            None => Ok(results),
            Some(error) => {
                warn!(error = %error, "Job interrupted");
                Err(JobsError::Interrupted {
                    error,
                    partial: Box::new(results),
                })
            }
        }
    }

    /// Run every interview
    pub async fn run(&self, cancel: Option<CancellationToken>) -> Result<Results, JobsError> {
        info!(
            interviews = self.interview_count(),
            questions = self.survey.len(),
            "Starting job"
        );
        self.execute(None, cancel).await
    }

    /// Run only the interviews at `indices`
    pub async fn run_only(
        &self,
        indices: Vec<usize>,
        cancel: Option<CancellationToken>,
    ) -> Result<Results, JobsError> {
        info!(interviews = indices.len(), "Re-running selected interviews");
        self.execute(Some(indices), cancel).await
    }

    /// Re-run the failed interviews of `previous` and merge the outcome into it
    pub async fn rerun(
        &self,
        previous: &Results,
        cancel: Option<CancellationToken>,
    ) -> Result<Results, JobsError> {
        let indices = previous.failed_indices();
        let mut merged = previous.clone();
        if indices.is_empty() {
            debug!("Nothing to re-run");
            return Ok(merged);
        }
        let fresh = self.run_only(indices, cancel).await?;
        merged.merge(fresh);
        Ok(merged)
    }
}
