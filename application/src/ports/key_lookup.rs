//! Key lookup port
//!
//! Supplies per-service rate limits that override what the model list says,
//! e.g. after an API key rotation changes the account tier.

use std::collections::BTreeMap;

/// Published limits for one service, per minute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceLimits {
    pub rpm: f64,
    pub tpm: f64,
}

impl ServiceLimits {
    pub fn new(rpm: f64, tpm: f64) -> Self {
        Self { rpm, tpm }
    }
}

pub trait KeyLookup: Send + Sync {
    /// Limits for every service this lookup knows about
    fn limits(&self) -> BTreeMap<String, ServiceLimits>;

    fn limits_for(&self, service: &str) -> Option<ServiceLimits> {
        self.limits().get(service).copied()
    }
}

/// Lookup that knows nothing; models keep their own limits
pub struct NoKeyLookup;

impl KeyLookup for NoKeyLookup {
    fn limits(&self) -> BTreeMap<String, ServiceLimits> {
        BTreeMap::new()
    }
}
