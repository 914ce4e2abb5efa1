//! Test doubles shared by the use case tests.

use crate::ports::llm_gateway::{GatewayError, LlmGateway, LlmRequest, LlmResponse};
use crate::ports::response_cache::{CachedResponse, ResponseCache};
use async_trait::async_trait;
use cohort_domain::Usage;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const CALL_USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 2,
};

/// Gateway answering from per-question scripts, falling back to a fixed answer.
///
/// Records every request it receives.
pub(crate) struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, GatewayError>>>>,
    fallback: String,
    /// Agents (by persona substring) whose calls always fail permanently
    broken_personas: Vec<String>,
    /// Agents whose calls panic inside the adapter
    panicking_personas: Vec<String>,
    latency: Duration,
    calls: Mutex<Vec<LlmRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub(crate) fn new(fallback: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: fallback.to_string(),
            broken_personas: Vec::new(),
            panicking_personas: Vec::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn script(self, question: &str, responses: Vec<Result<&str, GatewayError>>) -> Self {
        let queue = responses
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(question.to_string(), queue);
        self
    }

    pub(crate) fn failing_for(mut self, persona_fragment: &str) -> Self {
        self.broken_personas.push(persona_fragment.to_string());
        self
    }

    pub(crate) fn panicking_for(mut self, persona_fragment: &str) -> Self {
        self.panicking_personas.push(persona_fragment.to_string());
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn asked(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|r| r.question_name)
            .collect()
    }

    pub(crate) fn calls_for(&self, question: &str) -> usize {
        self.asked().iter().filter(|q| *q == question).count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn invoke(&self, request: &LlmRequest) -> Result<LlmResponse, GatewayError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .panicking_personas
            .iter()
            .any(|p| request.prompt.system.contains(p.as_str()))
        {
            panic!("adapter bug");
        }

        if self
            .broken_personas
            .iter()
            .any(|p| request.prompt.system.contains(p.as_str()))
        {
            return Err(GatewayError::Permanent("account suspended".to_string()));
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.question_name)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result.map(|content| LlmResponse::new(content, CALL_USAGE)),
            None => Ok(LlmResponse::new(self.fallback.clone(), CALL_USAGE)),
        }
    }
}

/// Minimal in-process cache
#[derive(Default)]
pub(crate) struct MapCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl MapCache {
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl ResponseCache for MapCache {
    fn get(&self, fingerprint: &str) -> Option<CachedResponse> {
        self.entries.lock().unwrap().get(fingerprint).cloned()
    }

    fn put(&self, fingerprint: &str, response: CachedResponse) {
        self.entries
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), response);
    }
}
