use axum::{routing::post, Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use super::engine::{ActionDecision, PolicyEngine, PolicyOutcome};
use super::policy::Policy;
use super::record::Record;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub policy: Policy,
    pub record: Record,
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub policies: Vec<Policy>,
    pub record: Record,
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

/// Router exposing policy evaluation. Requests may pin `today` for reproducible traces.
pub fn decision_router() -> Router {
    Router::new()
        .route("/api/v1/policies/evaluate", post(evaluate_handler))
        .route("/api/v1/policies/decide", post(decide_handler))
}

fn engine_for(today: Option<NaiveDate>) -> PolicyEngine {
    today.map(PolicyEngine::new).unwrap_or_else(PolicyEngine::for_today)
}

pub(crate) async fn evaluate_handler(
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<PolicyOutcome>, AppError> {
    let engine = engine_for(request.today);
    let outcome = engine.apply(&request.policy, &request.record)?;
    Ok(Json(outcome))
}

pub(crate) async fn decide_handler(
    Json(request): Json<DecideRequest>,
) -> Result<Json<ActionDecision>, AppError> {
    let engine = engine_for(request.today);
    let decision = engine.decide(&request.policies, &request.record)?;
    Ok(Json(decision))
}
