//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod interview;
pub mod run_interviews;
pub mod run_jobs;
pub mod shared;

#[cfg(test)]
mod test_support;
