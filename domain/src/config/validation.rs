//! Structured configuration issues.
//!
//! Run parameters and config files are checked before any interview starts.
//! Checks never fail outright; they return a list of issues and the caller
//! decides whether an [`Severity::Error`] aborts the run.
//!
//! ```
//! use cohort_domain::config::{ConfigIssue, ConfigIssueCode, Severity};
//!
//! let issue = ConfigIssue::error(ConfigIssueCode::ZeroConcurrency, "max_concurrent must be > 0");
//! assert_eq!(issue.severity, Severity::Error);
//! assert!(ConfigIssue::has_errors(&[issue]));
//! ```

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the run cannot start.
    Error,
    /// Non-fatal: the run works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// No models were configured.
    NoModels,
    /// `max_concurrent` is zero; nothing would ever run.
    ZeroConcurrency,
    /// `n_iterations` is zero; the job expands to no interviews.
    ZeroIterations,
    /// `llm_timeout` is zero; every call would time out.
    ZeroTimeout,
    /// A model has a negative or non-finite rate limit.
    InvalidRateLimit,
    /// A model has a zero rate limit; its buckets never refill.
    ZeroRateLimit,
    /// The same service/model pair appears twice.
    DuplicateModel,
    /// A retry policy field is out of range.
    InvalidRetryPolicy,
    /// A model entry has an empty model id or service.
    EmptyModelId,
    /// A `[services]` override names a service no model uses.
    UnknownServiceOverride,
}

/// A detected configuration issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn has_errors(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Error)
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_alone_are_not_errors() {
        let issues = vec![ConfigIssue::warning(ConfigIssueCode::ZeroRateLimit, "slow")];
        assert!(!ConfigIssue::has_errors(&issues));
    }

    #[test]
    fn display_prefixes_severity() {
        let issue = ConfigIssue::error(ConfigIssueCode::NoModels, "no models configured");
        assert_eq!(issue.to_string(), "error: no models configured");
    }
}
