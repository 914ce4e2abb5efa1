//! CLI entrypoint for cohort
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod cli;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use cli::Cli;
use cohort_application::{InterviewObserver, Jobs, JobsError, NoProgress, RunParams};
use cohort_domain::{ConfigIssue, Results};
use cohort_infrastructure::{
    CannedGateway, CannedResponses, ConfigKeyLookup, ConfigLoader, FileConfig,
    InMemoryResponseCache, JsonlInterviewLogger, SurveyFile, SurveyParts,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity level
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.show_config {
        for source in ConfigLoader::config_sources(cli.config.as_deref()) {
            println!("{}", source);
        }
        return Ok(());
    }

    let survey_path = match &cli.survey {
        Some(path) => path,
        None => bail!("A survey file is required. Use --show-config to inspect configuration."),
    };

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };

    let SurveyParts {
        survey,
        agents,
        scenarios,
    } = SurveyFile::load(survey_path)
        .and_then(SurveyFile::into_parts)
        .with_context(|| format!("Invalid survey {}", survey_path.display()))?;
    info!(
        questions = survey.len(),
        agents = agents.len(),
        scenarios = scenarios.len(),
        "Loaded survey"
    );

    let params = run_params(&cli, &config);

    if cli.check {
        let gateway = Arc::new(CannedGateway::new(CannedResponses::default()));
        let jobs = Jobs::new(survey, config.language_models(), gateway)
            .with_agents(agents)
            .with_scenarios(scenarios)
            .with_params(params);
        return check(&jobs, &config);
    }

    let responses_path = match &cli.responses {
        Some(path) => path,
        None => bail!("No model transport is configured. Pass --responses <PATH> or use --check."),
    };
    let responses = CannedResponses::load(responses_path)?;

    let cache = Arc::new(InMemoryResponseCache::new());
    let jobs = Jobs::new(
        survey,
        config.language_models(),
        Arc::new(CannedGateway::new(responses)),
    )
    .with_agents(agents)
    .with_scenarios(scenarios)
    .with_params(params)
    .with_key_lookup(Arc::new(ConfigKeyLookup::new(&config.services)))
    .with_cache(cache.clone())
    .with_observer(observer(&cli, &config));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running interviews to finish");
            signal_token.cancel();
        }
    });

    let mut results = finish(jobs.run(Some(cancel.clone())).await)?;
    if cli.retry_failed && !results.failed_indices().is_empty() && !cancel.is_cancelled() {
        info!(
            interviews = results.failed_indices().len(),
            "Re-running failed interviews"
        );
        results = finish(jobs.rerun(&results, Some(cancel.clone())).await)?;
    }

    let stats = cache.stats();
    info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        "Response cache"
    );

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// File settings with command-line overrides applied
fn run_params(cli: &Cli, config: &FileConfig) -> RunParams {
    let mut params = config.run_params();
    if let Some(n) = cli.iterations {
        params = params.with_iterations(n);
    }
    if let Some(n) = cli.max_concurrent {
        params = params.with_max_concurrent(n);
    }
    if cli.stop_on_exception {
        params = params.with_stop_on_exception(true);
    }
    params
}

fn observer(cli: &Cli, config: &FileConfig) -> Arc<dyn InterviewObserver> {
    let path = cli.events.as_deref().or(config.logging.events_file.as_deref());
    match path.and_then(JsonlInterviewLogger::new) {
        Some(logger) => {
            info!(path = %logger.path().display(), "Logging interview events");
            Arc::new(logger)
        }
        None => Arc::new(NoProgress),
    }
}

/// Keep what an interrupted run finished; fail on anything else
fn finish(outcome: Result<Results, JobsError>) -> Result<Results> {
    match outcome {
        Ok(results) => Ok(results),
        Err(JobsError::Interrupted { error, partial }) => {
            warn!(error = %error, "Run stopped early, reporting partial results");
            Ok(*partial)
        }
        Err(e) => Err(e.into()),
    }
}

fn check(jobs: &Jobs, config: &FileConfig) -> Result<()> {
    let mut issues = jobs.validate();
    for issue in config.validate() {
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }
    for issue in &issues {
        println!("{}", issue);
    }
    if ConfigIssue::has_errors(&issues) {
        bail!("Configuration has errors");
    }
    println!(
        "OK: {} questions, {} interviews",
        jobs.survey().len(),
        jobs.interview_count()
    );
    Ok(())
}
