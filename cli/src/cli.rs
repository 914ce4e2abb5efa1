//! CLI command definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for cohort
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(author, version, about = "Interview LLM-backed agents with a branching survey")]
#[command(long_about = r#"
cohort runs a survey against every combination of agent, scenario and model,
with per-service rate limiting, retries and branching rules.

Configuration files are loaded from (in priority order):
1. COHORT_* environment variables (COHORT_RUN__MAX_CONCURRENT=8)
2. --config <path>     Explicit config file
3. ./cohort.toml       Project-level config
4. ~/.config/cohort/config.toml   Global config

Example:
  cohort survey.toml --check
  cohort survey.toml --responses canned.toml --iterations 3 --events run.jsonl
"#)]
pub struct Cli {
    /// Survey file (TOML) to run
    pub survey: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Canned responses file answering for the models
    #[arg(long, value_name = "PATH")]
    pub responses: Option<PathBuf>,

    /// Validate the survey and configuration, then exit
    #[arg(long)]
    pub check: bool,

    /// Times each interview is repeated
    #[arg(long, value_name = "N")]
    pub iterations: Option<usize>,

    /// Interviews run at once
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Stop the whole run at the first interview with an unfixed exception
    #[arg(long)]
    pub stop_on_exception: bool,

    /// Re-run failed interviews once after the main run
    #[arg(long)]
    pub retry_failed: bool,

    /// Write interview events to this JSONL file
    #[arg(long, value_name = "PATH")]
    pub events: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}
