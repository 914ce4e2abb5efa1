//! LLM gateway adapters
//!
//! Real HTTP transports live outside this crate; [`CannedGateway`] answers
//! from a responses file for dry runs and demos.

pub mod canned;

pub use canned::{CannedAnswer, CannedGateway, CannedResponses, CannedResponsesError};
