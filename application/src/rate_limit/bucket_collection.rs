//! Per-service bucket pairs and the model → service registry
//!
//! Rate limits belong to services, not models: every model of one service
//! resolves to the same [`ModelBuckets`] instance. The registry is read on
//! every question and written only when models are added or limits change,
//! so it sits behind an `RwLock` and replaces whole pairs by swapping an `Arc`.

use super::token_bucket::{RateLimitError, TokenBucket};
use crate::ports::key_lookup::{KeyLookup, ServiceLimits};
use cohort_domain::LanguageModel;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Requests bucket and tokens bucket of one service
#[derive(Debug)]
pub struct ModelBuckets {
    pub requests: TokenBucket,
    pub tokens: TokenBucket,
}

impl ModelBuckets {
    /// Buckets sized from per-minute limits: capacity and refill are the per-second rate
    pub fn from_limits(service: &str, limits: ServiceLimits) -> Self {
        let rps = limits.rpm / 60.0;
        let tps = limits.tpm / 60.0;
        Self {
            requests: TokenBucket::new(format!("{service}:requests"), rps, rps),
            tokens: TokenBucket::new(format!("{service}:tokens"), tps, tps),
        }
    }

    pub fn infinity(service: &str) -> Self {
        Self {
            requests: TokenBucket::unlimited(format!("{service}:requests")),
            tokens: TokenBucket::unlimited(format!("{service}:tokens")),
        }
    }

    /// One request plus `tokens` estimated tokens. Returns the total wait.
    ///
    /// If the tokens cannot be had, the request unit is given back.
    pub async fn acquire(
        &self,
        tokens: f64,
        max_wait: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Duration, RateLimitError> {
        let request_wait = self.requests.acquire_with(1.0, max_wait, cancel).await?;
        let remaining = max_wait.map(|limit| limit.saturating_sub(request_wait));
        match self.tokens.acquire_with(tokens, remaining, cancel).await {
            Ok(token_wait) => Ok(request_wait + token_wait),
            Err(e) => {
                self.requests.refund(1.0);
                Err(e)
            }
        }
    }

    fn snapshot(&self, service: &str) -> BucketSnapshot {
        BucketSnapshot {
            service: service.to_string(),
            requests: BucketLevel::of(&self.requests),
            tokens: BucketLevel::of(&self.tokens),
        }
    }
}

/// Telemetry view of one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketLevel {
    pub capacity: f64,
    pub refill_rate: f64,
    pub level: f64,
    pub throughput: f64,
}

impl BucketLevel {
    fn of(bucket: &TokenBucket) -> Self {
        Self {
            capacity: bucket.capacity(),
            refill_rate: bucket.refill_rate(),
            level: bucket.level(),
            throughput: bucket.get_throughput(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSnapshot {
    pub service: String,
    pub requests: BucketLevel,
    pub tokens: BucketLevel,
}

#[derive(Debug, Default)]
struct Registry {
    /// `service/model` → service
    models_to_services: HashMap<String, String>,
    services_to_buckets: HashMap<String, Arc<ModelBuckets>>,
}

/// Registry mapping each model to its service's shared buckets
#[derive(Debug, Default)]
pub struct BucketCollection {
    infinity: bool,
    registry: RwLock<Registry>,
}

fn model_key(model: &LanguageModel) -> String {
    model.to_string()
}

impl BucketCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every bucket is unlimited; acquisitions never wait
    pub fn infinity() -> Self {
        Self {
            infinity: true,
            registry: RwLock::default(),
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.infinity
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_buckets(&self, service: &str, limits: ServiceLimits) -> Arc<ModelBuckets> {
        if self.infinity {
            Arc::new(ModelBuckets::infinity(service))
        } else {
            Arc::new(ModelBuckets::from_limits(service, limits))
        }
    }

    /// Register `model`, creating its service's buckets on first sight.
    ///
    /// The first model of a service decides the service's limits; later
    /// models of the same service share those buckets.
    pub fn add_model(&self, model: &LanguageModel) -> Arc<ModelBuckets> {
        let mut registry = self.write();
        registry
            .models_to_services
            .insert(model_key(model), model.service.clone());
        let buckets = registry
            .services_to_buckets
            .entry(model.service.clone())
            .or_insert_with(|| {
                debug!(
                    service = %model.service,
                    rpm = model.rpm,
                    tpm = model.tpm,
                    infinity = self.infinity,
                    "Created buckets"
                );
                self.fresh_buckets(&model.service, ServiceLimits::new(model.rpm, model.tpm))
            });
        Arc::clone(buckets)
    }

    /// Replace the buckets of every known service the lookup has limits for.
    ///
    /// Each replacement swaps in a whole new pair; tasks already holding the
    /// old pair finish their acquisition against it. Returns the updated services.
    pub fn update_from_key_lookup(&self, lookup: &dyn KeyLookup) -> Vec<String> {
        let limits = lookup.limits();
        let mut registry = self.write();
        let mut updated = Vec::new();
        for (service, limits) in limits {
            if !registry.services_to_buckets.contains_key(&service) {
                continue;
            }
            let buckets = self.fresh_buckets(&service, limits);
            registry.services_to_buckets.insert(service.clone(), buckets);
            info!(
                service = %service,
                rpm = limits.rpm,
                tpm = limits.tpm,
                "Replaced buckets from key lookup"
            );
            updated.push(service);
        }
        updated
    }

    /// Buckets shared by every model of `model.service`
    pub fn buckets_for(&self, model: &LanguageModel) -> Option<Arc<ModelBuckets>> {
        let registry = self.read();
        let service = registry.models_to_services.get(&model_key(model))?;
        registry.services_to_buckets.get(service).cloned()
    }

    /// Buckets for `model`, registering it first if needed
    pub fn resolve(&self, model: &LanguageModel) -> Arc<ModelBuckets> {
        match self.buckets_for(model) {
            Some(buckets) => buckets,
            None => self.add_model(model),
        }
    }

    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<_> = self.read().services_to_buckets.keys().cloned().collect();
        services.sort();
        services
    }

    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let pairs: Vec<(String, Arc<ModelBuckets>)> = self
            .read()
            .services_to_buckets
            .iter()
            .map(|(s, b)| (s.clone(), Arc::clone(b)))
            .collect();
        let mut snapshots: Vec<_> = pairs.iter().map(|(s, b)| b.snapshot(s)).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}
