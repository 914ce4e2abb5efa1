//! Process-local response cache keyed by prompt fingerprint.

use cohort_application::{CachedResponse, ResponseCache};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Counters for reporting cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// [`ResponseCache`] over a `Mutex<HashMap>`.
///
/// Shared by every interview of a run; lives as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryResponseCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl ResponseCache for InMemoryResponseCache {
    fn get(&self, fingerprint: &str) -> Option<CachedResponse> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(fingerprint).cloned());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        trace!(fingerprint, hit = found.is_some(), "Cache lookup");
        found
    }

    fn put(&self, fingerprint: &str, response: CachedResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(fingerprint.to_string(), response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_application::{Prompt, fingerprint};
    use cohort_domain::{LanguageModel, Usage};

    #[test]
    fn test_hits_and_misses_are_counted() {
        let cache = InMemoryResponseCache::new();
        let model = LanguageModel::new("m", "s", 60.0, 6000.0);
        let key = fingerprint(&Prompt::new("system", "Tea?"), &model);

        assert!(cache.get(&key).is_none());
        cache.put(
            &key,
            CachedResponse {
                content: "yes".into(),
                usage: Usage {
                    input_tokens: 5,
                    output_tokens: 1,
                },
            },
        );
        assert_eq!(cache.get(&key).unwrap().content, "yes");
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }
}
