use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::record::{format_number, parse_date, FieldValue, Record};
use super::trace::{EvaluationStep, StepStatus};

/// Comparison applied by a condition. Unknown operator names are kept verbatim so policy
/// validation can point at the offending condition instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    IsWithinNextDays,
    Unsupported(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "is_within_next_days" => Operator::IsWithinNextDays,
            other => Operator::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::IsWithinNextDays => "is_within_next_days",
            Operator::Unsupported(raw) => raw,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Operator::parse(&raw))
    }
}

/// Literal a condition compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl ConditionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionValue::Number(_) => "number",
            ConditionValue::Date(_) => "date",
            ConditionValue::Text(_) => "string",
        }
    }

    /// Textual form used by substring matching. Numbers have none.
    pub(crate) fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            ConditionValue::Text(text) => Some(Cow::Borrowed(text)),
            ConditionValue::Date(date) => Some(Cow::Owned(date.format("%Y-%m-%d").to_string())),
            ConditionValue::Number(_) => None,
        }
    }

    /// Day count for window operators; only non-negative whole numbers qualify.
    pub(crate) fn as_whole_days(&self) -> Option<u64> {
        match self {
            ConditionValue::Number(days)
                if days.is_finite()
                    && *days >= 0.0
                    && days.fract() == 0.0
                    && *days <= f64::from(u32::MAX) =>
            {
                Some(*days as u64)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Number(number) => f.write_str(&format_number(*number)),
            ConditionValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            ConditionValue::Text(text) => write!(f, "'{text}'"),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Text(value.to_string())
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

impl From<u32> for ConditionValue {
    fn from(value: u32) -> Self {
        ConditionValue::Number(f64::from(value))
    }
}

impl From<NaiveDate> for ConditionValue {
    fn from(value: NaiveDate) -> Self {
        ConditionValue::Date(value)
    }
}

/// Atomic predicate over a single record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<ConditionValue>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Human label shown for this condition in a trace.
    pub fn label(&self) -> String {
        format!("{} {} {}", self.field, self.operator, self.value)
    }

    pub(crate) fn details(&self) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        details.insert("field".to_string(), self.field.clone());
        details.insert("operator".to_string(), self.operator.to_string());
        details.insert("expected".to_string(), self.value.to_string());
        details
    }
}

struct Verdict {
    passed: bool,
    message: String,
    actual: Option<String>,
    resolved_field: Option<String>,
}

impl Verdict {
    fn pass(message: String, actual: &FieldValue) -> Self {
        Self {
            passed: true,
            message,
            actual: Some(actual.to_string()),
            resolved_field: None,
        }
    }

    fn fail(message: String, actual: Option<&FieldValue>) -> Self {
        Self {
            passed: false,
            message,
            actual: actual.map(FieldValue::to_string),
            resolved_field: None,
        }
    }

    fn from_outcome(passed: bool, message: String, actual: &FieldValue) -> Self {
        if passed {
            Self::pass(message, actual)
        } else {
            Self::fail(message, Some(actual))
        }
    }

    fn resolved_from(mut self, path: &str) -> Self {
        self.resolved_field = Some(path.to_string());
        self
    }

    fn into_step(self, condition: &Condition) -> EvaluationStep {
        let mut details = condition.details();
        if let Some(actual) = self.actual {
            details.insert("actual".to_string(), actual);
        }
        if let Some(path) = self.resolved_field {
            details.insert("resolved_field".to_string(), path);
        }

        EvaluationStep {
            step: condition.label(),
            status: if self.passed {
                StepStatus::Pass
            } else {
                StepStatus::Fail
            },
            message: self.message,
            details: Some(details),
        }
    }
}

/// Evaluates one condition against a record relative to a fixed "today".
///
/// Evaluation never fails: absent fields, nulls and type mismatches all produce a `FAIL` step
/// with an explanatory message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionEvaluator {
    today: NaiveDate,
}

impl ConditionEvaluator {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn evaluate(&self, condition: &Condition, record: &Record) -> EvaluationStep {
        let verdict = match &condition.operator {
            Operator::Equals => equality(condition, record, true),
            Operator::NotEquals => equality(condition, record, false),
            Operator::Contains => contains(condition, record),
            Operator::IsWithinNextDays => self.within_next_days(condition, record),
            Operator::Unsupported(raw) => {
                Verdict::fail(format!("operator '{raw}' is not supported"), None)
            }
        };

        verdict.into_step(condition)
    }

    fn within_next_days(&self, condition: &Condition, record: &Record) -> Verdict {
        let Some(days) = condition.value.as_whole_days() else {
            return Verdict::fail(
                format!(
                    "window must be a non-negative whole number of days, found {}",
                    condition.value
                ),
                None,
            );
        };

        let (path, actual) = match resolve_date_field(record, &condition.field) {
            Ok(found) => found,
            Err(verdict) => return verdict,
        };

        let due = match actual {
            FieldValue::Date(date) => *date,
            FieldValue::Text(raw) => match parse_date(raw) {
                Some(date) => date,
                None => {
                    return Verdict::fail(format!("{path} value {actual} is not a date"), Some(actual))
                        .resolved_from(&path)
                }
            },
            other => {
                return Verdict::fail(
                    format!("{path} is a {} and cannot be read as a date", other.kind()),
                    Some(other),
                )
                .resolved_from(&path)
            }
        };

        let Some(window_end) = self.today.checked_add_days(Days::new(days)) else {
            return Verdict::fail(
                format!("a {days} day window from {} exceeds the calendar", self.today),
                Some(actual),
            )
            .resolved_from(&path);
        };

        let verdict = if due < self.today {
            Verdict::fail(
                format!("{path} {due} is already past (today is {})", self.today),
                Some(actual),
            )
        } else if due > window_end {
            Verdict::fail(
                format!("{path} {due} falls after the {days} day window ending {window_end}"),
                Some(actual),
            )
        } else {
            Verdict::pass(
                format!("{path} {due} is within {days} day(s) of {}", self.today),
                actual,
            )
        };

        verdict.resolved_from(&path)
    }
}

fn present<'r>(record: &'r Record, field: &str) -> Result<&'r FieldValue, Verdict> {
    match record.get(field) {
        None => Err(Verdict::fail(format!("field '{field}' is absent"), None)),
        Some(FieldValue::Null) => Err(Verdict::fail(
            format!("field '{field}' is null"),
            Some(&FieldValue::Null),
        )),
        Some(value) => Ok(value),
    }
}

/// Date conditions fall back to a `<field>_date` companion when the named field is absent.
fn resolve_date_field<'r>(
    record: &'r Record,
    field: &str,
) -> Result<(String, &'r FieldValue), Verdict> {
    match present(record, field) {
        Ok(value) => Ok((field.to_string(), value)),
        Err(primary) => {
            let companion = format!("{field}_date");
            match record.get(&companion) {
                Some(value) if *value != FieldValue::Null => Ok((companion, value)),
                _ => Err(primary),
            }
        }
    }
}

fn equality(condition: &Condition, record: &Record, expect_equal: bool) -> Verdict {
    let field = condition.field.as_str();
    let actual = match present(record, field) {
        Ok(value) => value,
        Err(verdict) => return verdict,
    };

    let Some(equal) = coerced_equals(actual, &condition.value) else {
        return Verdict::fail(
            format!(
                "cannot compare {} field '{field}' with {} {}",
                actual.kind(),
                condition.value.kind(),
                condition.value
            ),
            Some(actual),
        );
    };

    let message = match (equal, expect_equal) {
        (true, true) => format!("{field} equals {}", condition.value),
        (false, true) => format!("{field} is {actual}, expected {}", condition.value),
        (false, false) => format!("{field} is {actual}, which differs from {}", condition.value),
        (true, false) => format!("{field} is {actual}, matching the excluded value"),
    };

    Verdict::from_outcome(equal == expect_equal, message, actual)
}

/// Strict equality after coercing the literal to the field's native type.
/// `None` means the literal cannot be expressed in that type.
fn coerced_equals(actual: &FieldValue, expected: &ConditionValue) -> Option<bool> {
    match (actual, expected) {
        (FieldValue::Text(text), ConditionValue::Text(literal)) => Some(text == literal),
        (FieldValue::Text(text), ConditionValue::Number(number)) => {
            Some(*text == format_number(*number))
        }
        (FieldValue::Text(text), ConditionValue::Date(date)) => {
            Some(*text == date.format("%Y-%m-%d").to_string())
        }
        (FieldValue::Number(value), ConditionValue::Number(number)) => Some(value == number),
        (FieldValue::Number(value), ConditionValue::Text(literal)) => {
            literal.trim().parse::<f64>().ok().map(|number| *value == number)
        }
        (FieldValue::Date(value), ConditionValue::Date(date)) => Some(value == date),
        (FieldValue::Date(value), ConditionValue::Text(literal)) => {
            parse_date(literal).map(|date| *value == date)
        }
        (FieldValue::Number(_), ConditionValue::Date(_))
        | (FieldValue::Date(_), ConditionValue::Number(_))
        | (FieldValue::Null, _) => None,
    }
}

fn contains(condition: &Condition, record: &Record) -> Verdict {
    let field = condition.field.as_str();
    let actual = match present(record, field) {
        Ok(value) => value,
        Err(verdict) => return verdict,
    };

    // Date fields were ISO strings on the wire, so they are searched by that text.
    let text: Cow<'_, str> = match actual {
        FieldValue::Text(text) => Cow::Borrowed(text.as_str()),
        FieldValue::Date(date) => Cow::Owned(date.format("%Y-%m-%d").to_string()),
        FieldValue::Number(_) | FieldValue::Null => {
            return Verdict::fail(
                format!(
                    "contains requires a string field; '{field}' is a {}",
                    actual.kind()
                ),
                Some(actual),
            )
        }
    };

    let Some(needle) = condition.value.as_text() else {
        return Verdict::fail(
            format!("contains requires a string value, found {}", condition.value),
            Some(actual),
        );
    };

    let found = text.to_lowercase().contains(&needle.to_lowercase());
    let message = if found {
        format!("{field} {actual} contains '{needle}'")
    } else {
        format!("{field} {actual} does not contain '{needle}'")
    };

    Verdict::from_outcome(found, message, actual)
}
