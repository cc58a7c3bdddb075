use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::job::{Job, JobId, JobKind, JobResult};
use super::orchestrator::JobOrchestrator;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub kind: JobKind,
}

/// Router exposing job creation, result intake, and polling.
pub fn ingestion_router(orchestrator: Arc<JobOrchestrator>) -> Router {
    Router::new()
        .route(
            "/api/v1/ingestion/jobs",
            post(create_handler).get(list_handler),
        )
        .route(
            "/api/v1/ingestion/jobs/:job_id",
            get(snapshot_handler).delete(discard_handler),
        )
        .route(
            "/api/v1/ingestion/jobs/:job_id/results",
            post(append_handler),
        )
        .route(
            "/api/v1/ingestion/jobs/:job_id/finalize",
            post(finalize_handler),
        )
        .with_state(orchestrator)
}

pub(crate) async fn create_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Json(request): Json<CreateJobRequest>,
) -> (StatusCode, Json<Job>) {
    let job = orchestrator.create(request.kind);
    (StatusCode::CREATED, Json(job))
}

pub(crate) async fn list_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
) -> Json<Vec<Job>> {
    Json(orchestrator.jobs())
}

pub(crate) async fn snapshot_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let job = orchestrator.snapshot(&JobId(job_id))?;
    Ok(Json(job))
}

pub(crate) async fn append_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
    Json(result): Json<JobResult>,
) -> Result<Json<Job>, AppError> {
    let job = orchestrator.append_result(&JobId(job_id), result)?;
    Ok(Json(job))
}

pub(crate) async fn finalize_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let job = orchestrator.finalize(&JobId(job_id))?;
    Ok(Json(job))
}

pub(crate) async fn discard_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let job = orchestrator.discard(&JobId(job_id))?;
    Ok(Json(job))
}
