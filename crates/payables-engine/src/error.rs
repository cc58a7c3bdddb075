use crate::config::ConfigError;
use crate::decisions::PolicyValidationError;
use crate::ingestion::JobLifecycleError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Json(serde_json::Error),
    Policy(PolicyValidationError),
    Job(JobLifecycleError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Policy(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Job(JobLifecycleError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Job(_) => StatusCode::CONFLICT,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Json(err) => write!(f, "invalid json: {}", err),
            AppError::Policy(err) => write!(f, "policy rejected: {}", err),
            AppError::Job(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Policy(err) => Some(err),
            AppError::Job(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Policy(err) => json!({
                "error": self.to_string(),
                "condition_index": err.condition_index(),
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<PolicyValidationError> for AppError {
    fn from(value: PolicyValidationError) -> Self {
        Self::Policy(value)
    }
}

impl From<JobLifecycleError> for AppError {
    fn from(value: JobLifecycleError) -> Self {
        Self::Job(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{JobId, JobStatus};

    #[test]
    fn lifecycle_errors_map_to_client_statuses() {
        let missing = AppError::from(JobLifecycleError::NotFound(JobId("job-000042".into())));
        let terminal = AppError::from(JobLifecycleError::AlreadyTerminal {
            job_id: JobId("job-000042".into()),
            status: JobStatus::Failed,
        });
        let empty = AppError::from(JobLifecycleError::NoResults(JobId("job-000042".into())));

        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(terminal.status_code(), StatusCode::CONFLICT);
        assert_eq!(empty.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn policy_errors_are_unprocessable() {
        let err = AppError::from(PolicyValidationError::EmptyField { index: 2 });
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(std::error::Error::source(&err).is_some());
    }
}
