//! Token estimation port
//!
//! The tokens bucket needs a request size before the model has answered.
//! Estimators only need to be roughly right; the bucket absorbs the error.

use super::llm_gateway::Prompt;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, prompt: &Prompt) -> u64;
}

/// Characters-per-token heuristic with a fixed per-message overhead
#[derive(Debug, Clone)]
pub struct CharRatioEstimator {
    pub chars_per_token: u64,
    /// Role and separator tokens per message
    pub message_overhead: u64,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            message_overhead: 4,
        }
    }
}

impl CharRatioEstimator {
    fn estimate_text(&self, text: &str) -> u64 {
        (text.len() as u64).div_ceil(self.chars_per_token.max(1))
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, prompt: &Prompt) -> u64 {
        2 * self.message_overhead
            + self.estimate_text(&prompt.system)
            + self.estimate_text(&prompt.user)
    }
}
