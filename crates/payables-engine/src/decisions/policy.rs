use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::condition::{Condition, ConditionValue, Operator};

/// How a policy combines its conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
    Unsupported(String),
}

impl LogicalOperator {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "AND" => LogicalOperator::And,
            "OR" => LogicalOperator::Or,
            _ => LogicalOperator::Unsupported(trimmed.to_string()),
        }
    }

    fn unspecified() -> Self {
        LogicalOperator::Unsupported(String::new())
    }

    pub fn as_str(&self) -> &str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Unsupported(raw) => raw,
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogicalOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(LogicalOperator::parse(&raw))
    }
}

/// Validated form of [`LogicalOperator`] that the engine branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connective {
    All,
    Any,
}

/// Authored rule deciding whether `action_type` applies to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "LogicalOperator::unspecified")]
    pub logical_operator: LogicalOperator,
    pub action_type: String,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        logical_operator: LogicalOperator,
        action_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            conditions: Vec::new(),
            logical_operator,
            action_type: action_type.into(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Reject authoring errors before anything is evaluated.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        self.connective().map(|_| ())
    }

    pub(crate) fn connective(&self) -> Result<Connective, PolicyValidationError> {
        let connective = match &self.logical_operator {
            LogicalOperator::And => Connective::All,
            LogicalOperator::Or => Connective::Any,
            LogicalOperator::Unsupported(raw) => {
                return Err(PolicyValidationError::UnsupportedLogicalOperator(raw.clone()))
            }
        };

        for (index, condition) in self.conditions.iter().enumerate() {
            validate_condition(index, condition)?;
        }

        Ok(connective)
    }
}

fn validate_condition(index: usize, condition: &Condition) -> Result<(), PolicyValidationError> {
    if condition.field.trim().is_empty() {
        return Err(PolicyValidationError::EmptyField { index });
    }

    match &condition.operator {
        Operator::Unsupported(raw) => Err(PolicyValidationError::UnsupportedOperator {
            index,
            operator: raw.clone(),
        }),
        Operator::Equals | Operator::NotEquals => Ok(()),
        Operator::Contains => match condition.value {
            ConditionValue::Number(_) => Err(invalid_value(index, condition, "a string")),
            ConditionValue::Text(_) | ConditionValue::Date(_) => Ok(()),
        },
        Operator::IsWithinNextDays => match condition.value.as_whole_days() {
            Some(_) => Ok(()),
            None => Err(invalid_value(
                index,
                condition,
                "a non-negative whole number of days",
            )),
        },
    }
}

fn invalid_value(
    index: usize,
    condition: &Condition,
    expected: &'static str,
) -> PolicyValidationError {
    PolicyValidationError::InvalidValue {
        index,
        operator: condition.operator.to_string(),
        expected,
        found: condition.value.to_string(),
    }
}

/// Authoring error in a policy. Always fatal to the evaluation call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyValidationError {
    #[error("condition {index}: operator '{operator}' is not supported")]
    UnsupportedOperator { index: usize, operator: String },
    #[error("condition {index}: {operator} expects {expected}, found {found}")]
    InvalidValue {
        index: usize,
        operator: String,
        expected: &'static str,
        found: String,
    },
    #[error("condition {index}: field path is empty")]
    EmptyField { index: usize },
    #[error("logical operator '{0}' must be AND or OR")]
    UnsupportedLogicalOperator(String),
    #[error("policy '{policy_id}': {source}")]
    InPolicy {
        policy_id: String,
        #[source]
        source: Box<PolicyValidationError>,
    },
}

impl PolicyValidationError {
    /// Index of the offending condition, when the error is tied to one.
    pub fn condition_index(&self) -> Option<usize> {
        match self {
            PolicyValidationError::UnsupportedOperator { index, .. }
            | PolicyValidationError::InvalidValue { index, .. }
            | PolicyValidationError::EmptyField { index } => Some(*index),
            PolicyValidationError::UnsupportedLogicalOperator(_) => None,
            PolicyValidationError::InPolicy { source, .. } => source.condition_index(),
        }
    }

    pub(crate) fn in_policy(self, policy_id: &str) -> Self {
        PolicyValidationError::InPolicy {
            policy_id: policy_id.to_string(),
            source: Box::new(self),
        }
    }
}
