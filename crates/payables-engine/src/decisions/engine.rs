use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::condition::ConditionEvaluator;
use super::policy::{Connective, Policy, PolicyValidationError};
use super::record::Record;
use super::trace::{EvaluationStep, StepStatus};

/// Verdict for one policy plus the per-condition audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub policy_id: String,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    pub trace: Vec<EvaluationStep>,
}

/// Result of running an ordered policy set: the first matching policy wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action_type: Option<String>,
    pub policy_id: Option<String>,
    /// Outcomes for every policy evaluated, in order, up to and including the match.
    pub outcomes: Vec<PolicyOutcome>,
}

/// Stateless policy evaluator. Safe to share and call concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEngine {
    evaluator: ConditionEvaluator,
}

impl PolicyEngine {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            evaluator: ConditionEvaluator::new(today),
        }
    }

    /// Engine anchored on the local calendar date.
    pub fn for_today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn today(&self) -> NaiveDate {
        self.evaluator.today()
    }

    /// Evaluate one policy against a record.
    ///
    /// Conditions run in declaration order. `AND` stops at the first `FAIL`, `OR` at the first
    /// `PASS`; every remaining condition is still reported as an `INFO` step so the trace always
    /// holds exactly one entry per condition. A policy without conditions never matches.
    pub fn apply(
        &self,
        policy: &Policy,
        record: &Record,
    ) -> Result<PolicyOutcome, PolicyValidationError> {
        let connective = policy.connective().map_err(|err| {
            debug!(policy_id = %policy.id, error = %err, "policy rejected");
            err
        })?;

        Ok(self.evaluate(policy, connective, record))
    }

    /// Evaluate an ordered policy set and pick the action of the first match.
    ///
    /// Every policy is validated up front so a malformed policy late in the list cannot be
    /// masked by an earlier match.
    pub fn decide(
        &self,
        policies: &[Policy],
        record: &Record,
    ) -> Result<ActionDecision, PolicyValidationError> {
        let connectives = policies
            .iter()
            .map(|policy| {
                policy.connective().map_err(|err| {
                    debug!(policy_id = %policy.id, error = %err, "policy set rejected");
                    err.in_policy(&policy.id)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut outcomes = Vec::new();
        for (policy, connective) in policies.iter().zip(connectives) {
            let outcome = self.evaluate(policy, connective, record);
            let matched = outcome.matched;
            outcomes.push(outcome);

            if matched {
                debug!(policy_id = %policy.id, action = %policy.action_type, "policy matched");
                return Ok(ActionDecision {
                    action_type: Some(policy.action_type.clone()),
                    policy_id: Some(policy.id.clone()),
                    outcomes,
                });
            }
        }

        Ok(ActionDecision {
            action_type: None,
            policy_id: None,
            outcomes,
        })
    }

    fn evaluate(&self, policy: &Policy, connective: Connective, record: &Record) -> PolicyOutcome {
        if policy.conditions.is_empty() {
            return PolicyOutcome {
                policy_id: policy.id.clone(),
                matched: false,
                action_type: None,
                trace: Vec::new(),
            };
        }

        let settles_on = match connective {
            Connective::All => StepStatus::Fail,
            Connective::Any => StepStatus::Pass,
        };

        let mut trace = Vec::with_capacity(policy.conditions.len());
        let mut settled = false;
        for condition in &policy.conditions {
            if settled {
                trace.push(EvaluationStep::skipped(condition));
                continue;
            }

            let step = self.evaluator.evaluate(condition, record);
            settled = step.status == settles_on;
            trace.push(step);
        }

        // AND matches unless something failed; OR matches only if something passed.
        let matched = match connective {
            Connective::All => !settled,
            Connective::Any => settled,
        };

        PolicyOutcome {
            policy_id: policy.id.clone(),
            matched,
            action_type: matched.then(|| policy.action_type.clone()),
            trace,
        }
    }
}
