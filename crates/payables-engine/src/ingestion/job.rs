use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for ingestion jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the job's documents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Upload,
}

/// Lifecycle of an ingestion job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    PartiallyFailed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::PartiallyFailed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::PartiallyFailed => "partially_failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
}

/// Document classes the extraction pipeline recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    PurchaseOrder,
    Receipt,
    Statement,
    Contract,
    Other,
}

impl DocumentType {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::PurchaseOrder => "purchase order",
            DocumentType::Receipt => "receipt",
            DocumentType::Statement => "statement",
            DocumentType::Contract => "contract",
            DocumentType::Other => "document",
        }
    }
}

/// Outcome for one processed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub filename: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_id: Option<String>,
    pub message: String,
}

impl JobResult {
    pub fn success(
        filename: impl Into<String>,
        document_type: DocumentType,
        extracted_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            status: ResultStatus::Success,
            document_type: Some(document_type),
            extracted_id,
            message: message.into(),
        }
    }

    pub fn failure(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: ResultStatus::Failure,
            document_type: None,
            extracted_id: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Snapshot of a bulk ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: Vec<JobResult>,
}

impl Job {
    pub(crate) fn queued(id: JobId, kind: JobKind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            completed_at: None,
            summary: Vec::new(),
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.summary.iter().filter(|result| result.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.summary.len() - self.succeeded_count()
    }

    /// Append a result, moving `Queued` to `Running`. Terminal jobs are left untouched.
    pub(crate) fn record(
        &mut self,
        result: JobResult,
        now: DateTime<Utc>,
    ) -> Result<(), JobLifecycleError> {
        if self.status.is_terminal() {
            return Err(JobLifecycleError::AlreadyTerminal {
                job_id: self.id.clone(),
                status: self.status,
            });
        }

        self.summary.push(result);
        self.status = JobStatus::Running;
        self.updated_at = now;
        Ok(())
    }

    /// Freeze the job in its terminal status.
    ///
    /// Returns `true` only for the call that performed the transition; later calls leave the
    /// frozen snapshot untouched.
    pub(crate) fn freeze(&mut self, now: DateTime<Utc>) -> Result<bool, JobLifecycleError> {
        if self.status.is_terminal() {
            return Ok(false);
        }

        let status = aggregate_status(&self.summary)
            .ok_or_else(|| JobLifecycleError::NoResults(self.id.clone()))?;

        self.status = status;
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(true)
    }
}

/// Terminal status implied by a set of results; `None` when there are no results.
pub fn aggregate_status(summary: &[JobResult]) -> Option<JobStatus> {
    if summary.is_empty() {
        return None;
    }

    let succeeded = summary.iter().filter(|result| result.is_success()).count();
    let status = if succeeded == summary.len() {
        JobStatus::Succeeded
    } else if succeeded == 0 {
        JobStatus::Failed
    } else {
        JobStatus::PartiallyFailed
    };
    Some(status)
}

/// Caller-contract violations against the job lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobLifecycleError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {job_id} is already {status}; no further results are accepted")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },
    #[error("job {0} has no results to finalize")]
    NoResults(JobId),
    #[error("ingestion batch contained no items")]
    EmptyBatch,
}
