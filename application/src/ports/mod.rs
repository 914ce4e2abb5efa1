//! Port definitions (interfaces for external collaborators)
//!
//! Ports define the contracts that infrastructure adapters must implement.
//! Where a sensible in-process implementation exists it lives next to its
//! trait ([`TemplatePromptRenderer`](prompt_renderer::TemplatePromptRenderer),
//! [`CharRatioEstimator`](token_estimator::CharRatioEstimator),
//! [`KindValidator`](answer_validator::KindValidator)).

pub mod answer_validator;
pub mod key_lookup;
pub mod llm_gateway;
pub mod progress;
pub mod prompt_renderer;
pub mod response_cache;
pub mod token_estimator;
