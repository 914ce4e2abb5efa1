//! Domain layer for cohort
//!
//! This crate contains the survey model and interview records. It has no
//! dependencies on async runtimes, LLM providers or configuration files.
//!
//! # Core Concepts
//!
//! ## Survey
//!
//! A [`Survey`] is an ordered list of [`Question`]s plus a [`RuleCollection`]
//! that decides, after each answer, which question comes next. Rules are
//! strictly forward-moving, so every interview terminates.
//!
//! ## Interview
//!
//! One (agent, scenario, model, iteration) tuple answering the survey. Its
//! progress lives in an [`InterviewState`] and ends up as an
//! [`InterviewResult`]; a job collects them into [`Results`].

pub mod config;
pub mod core;
pub mod interview;
pub mod survey;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigIssueCode, Severity};
pub use core::{
    agent::{Agent, Scenario, display_value},
    error::ValidationError,
    model::LanguageModel,
    question::{Question, QuestionKind},
};
pub use interview::{
    AnswerEnvironment, ErrorKind, ExceptionLog, FailedInterview, InterviewException,
    InterviewIdentity, InterviewResult, InterviewState, QuestionRecord, QuestionStatus, Results,
    Usage,
};
pub use survey::{
    Environment, EvalError, Expr, ExpressionError, MemoryPlan, NextQuestion, Rule, RuleCollection,
    RuleDecision, RuleKind, Survey, SurveyError, Target,
};
