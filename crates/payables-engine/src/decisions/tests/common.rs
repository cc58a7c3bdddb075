use axum::http::StatusCode;
use axum::response::Response;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use crate::decisions::{
    Condition, ConditionValue, LogicalOperator, Operator, Policy, PolicyEngine, Record,
};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
}

pub(super) fn days_from_today(days: u64) -> NaiveDate {
    today()
        .checked_add_days(Days::new(days))
        .expect("date in range")
}

pub(super) fn engine() -> PolicyEngine {
    PolicyEngine::new(today())
}

pub(super) fn overdue_record() -> Record {
    Record::new()
        .with_field("customer.name", "Harbor Freight Logistics")
        .with_field("customer.segment", "Enterprise")
        .with_field("invoice.status", "overdue")
        .with_field("invoice.balance", 4820.0)
        .with_field("invoice.memo", "Q3 fuel surcharge, DISPUTED by AP")
        .with_field("invoice.due_date", days_from_today(3))
}

pub(super) fn condition(field: &str, operator: Operator, value: impl Into<ConditionValue>) -> Condition {
    Condition::new(field, operator, value)
}

pub(super) fn policy(logical_operator: LogicalOperator, conditions: Vec<Condition>) -> Policy {
    Policy {
        id: "pol-test".to_string(),
        name: "Test policy".to_string(),
        conditions,
        logical_operator,
        action_type: "send_reminder".to_string(),
    }
}

pub(super) fn due_soon_policy(days: u32) -> Policy {
    policy(
        LogicalOperator::And,
        vec![condition(
            "days_overdue",
            Operator::IsWithinNextDays,
            ConditionValue::Number(f64::from(days)),
        )],
    )
}

pub(super) async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let payload = serde_json::from_slice(&bytes).expect("json payload");
    (status, payload)
}
