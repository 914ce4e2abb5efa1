//! Response cache port
//!
//! The interview looks a prompt up before calling the model and stores the raw
//! response afterwards. Cached content is re-validated like a fresh response.

use super::llm_gateway::Prompt;
use cohort_domain::{LanguageModel, Usage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub content: String,
    pub usage: Usage,
}

pub trait ResponseCache: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<CachedResponse>;

    fn put(&self, fingerprint: &str, response: CachedResponse);
}

/// Cache that never hits
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _fingerprint: &str) -> Option<CachedResponse> {
        None
    }

    fn put(&self, _fingerprint: &str, _response: CachedResponse) {}
}

/// SHA-256 (hex) over the prompt, the model identity and its parameters.
///
/// Fields are length-prefixed so that moving text between the system and
/// user messages always changes the fingerprint.
pub fn fingerprint(prompt: &Prompt, model: &LanguageModel) -> String {
    let mut hasher = Sha256::new();
    for part in [
        prompt.system.as_str(),
        prompt.user.as_str(),
        model.service.as_str(),
        model.model.as_str(),
        model.parameters_json().as_str(),
    ] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
