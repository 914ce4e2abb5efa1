//! Core value objects shared across the survey and interview subdomains.
//!
//! - [`model::LanguageModel`]: a backend model and its published rate limits
//! - [`agent::Agent`] / [`agent::Scenario`]: who answers, and with which substitutions
//! - [`question::Question`]: one survey item and how its answers are validated
//! - [`error::ValidationError`]: answer-shape failures

pub mod agent;
pub mod error;
pub mod model;
pub mod question;
pub mod string;
