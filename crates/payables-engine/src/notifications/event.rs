use serde::{Deserialize, Serialize};

use crate::ingestion::{JobId, JobKind, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    SyncStarted,
    SyncCompleted,
}

/// Job milestone announcement. Fire-and-forget: nothing is retained after delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub job_id: JobId,
    pub kind: SyncEventKind,
    /// Whether the job came from a connected source sync or a manual upload.
    pub source: JobKind,
    /// Job status at the moment the event was published.
    pub status: JobStatus,
}

impl SyncEvent {
    pub fn started(job_id: JobId, source: JobKind) -> Self {
        Self {
            job_id,
            kind: SyncEventKind::SyncStarted,
            source,
            status: JobStatus::Queued,
        }
    }

    pub fn completed(job_id: JobId, source: JobKind, status: JobStatus) -> Self {
        Self {
            job_id,
            kind: SyncEventKind::SyncCompleted,
            source,
            status,
        }
    }
}
