//! Survey definition and branching logic
//!
//! - [`entities::Survey`]: ordered questions, rules and memory plan
//! - [`rule::Rule`] / [`rule_collection::RuleCollection`]: the branching state machine
//! - [`expression::Expr`]: parsed rule conditions
//! - [`memory::MemoryPlan`]: which prior answers a question may see

pub mod entities;
pub mod error;
pub mod expression;
pub mod memory;
pub mod rule;
pub mod rule_collection;

pub use entities::{Survey, Target};
pub use error::SurveyError;
pub use expression::{Environment, EvalError, Expr, ExpressionError};
pub use memory::MemoryPlan;
pub use rule::{NextQuestion, Rule, RuleKind};
pub use rule_collection::{RuleCollection, RuleDecision};
