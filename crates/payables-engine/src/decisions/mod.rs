//! Policy-based decisions with an explainable, per-condition trace.

mod condition;
mod engine;
mod policy;
mod record;
pub mod router;
mod trace;

#[cfg(test)]
mod tests;

pub use condition::{Condition, ConditionEvaluator, ConditionValue, Operator};
pub use engine::{ActionDecision, PolicyEngine, PolicyOutcome};
pub use policy::{LogicalOperator, Policy, PolicyValidationError};
pub use record::{FieldValue, Record};
pub use router::decision_router;
pub use trace::{EvaluationStep, StepStatus, SHORT_CIRCUIT_MESSAGE};
