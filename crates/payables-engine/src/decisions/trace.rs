use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Message recorded for conditions that were never evaluated.
pub const SHORT_CIRCUIT_MESSAGE: &str = "skipped — short-circuited";

/// Verdict of a single trace step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Pass,
    Fail,
    /// Condition was not evaluated because the policy verdict was already settled.
    Info,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Pass => "PASS",
            StepStatus::Fail => "FAIL",
            StepStatus::Info => "INFO",
        }
    }
}

/// One audit entry per authored condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl EvaluationStep {
    pub(crate) fn skipped(condition: &Condition) -> Self {
        Self {
            step: condition.label(),
            status: StepStatus::Info,
            message: SHORT_CIRCUIT_MESSAGE.to_string(),
            details: Some(condition.details()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == StepStatus::Pass
    }

    pub fn is_fail(&self) -> bool {
        self.status == StepStatus::Fail
    }

    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Info
    }
}
