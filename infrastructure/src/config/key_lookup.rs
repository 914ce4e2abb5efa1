//! Key lookup backed by the `[services]` config section

use super::file_config::FileServiceLimits;
use cohort_application::{KeyLookup, ServiceLimits};
use std::collections::BTreeMap;

/// Per-service limits taken from configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigKeyLookup {
    limits: BTreeMap<String, ServiceLimits>,
}

impl ConfigKeyLookup {
    pub fn new(services: &BTreeMap<String, FileServiceLimits>) -> Self {
        let limits = services
            .iter()
            .map(|(name, l)| (name.clone(), ServiceLimits::new(l.rpm, l.tpm)))
            .collect();
        Self { limits }
    }
}

impl KeyLookup for ConfigKeyLookup {
    fn limits(&self) -> BTreeMap<String, ServiceLimits> {
        self.limits.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_application::BucketCollection;
    use cohort_domain::LanguageModel;

    #[test]
    fn test_overrides_resize_known_services() {
        let services = BTreeMap::from([(
            "openai".to_string(),
            FileServiceLimits {
                rpm: 6000.0,
                tpm: 60_000.0,
            },
        )]);
        let lookup = ConfigKeyLookup::new(&services);
        assert_eq!(lookup.limits_for("openai").unwrap().rpm, 6000.0);
        assert!(lookup.limits_for("anthropic").is_none());

        let buckets = BucketCollection::new();
        let model = LanguageModel::new("gpt-4o", "openai", 60.0, 600.0);
        buckets.add_model(&model);
        assert_eq!(buckets.update_from_key_lookup(&lookup), vec!["openai"]);
        assert_eq!(buckets.buckets_for(&model).unwrap().requests.refill_rate(), 100.0);
    }
}
