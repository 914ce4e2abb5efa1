//! Configuration value objects shared by the application and infrastructure layers

pub mod validation;

pub use validation::{ConfigIssue, ConfigIssueCode, Severity};
