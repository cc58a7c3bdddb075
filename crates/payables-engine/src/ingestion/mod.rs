//! Bulk ingestion job tracking: lifecycle, aggregation, and milestone announcements.

mod extract;
mod job;
mod orchestrator;
pub mod router;

#[cfg(test)]
mod tests;

pub use extract::{DocumentExtractor, Extraction, ExtractionError, IngestionItem};
pub use job::{
    aggregate_status, DocumentType, Job, JobId, JobKind, JobLifecycleError, JobResult,
    JobStatus, ResultStatus,
};
pub use orchestrator::JobOrchestrator;
pub use router::ingestion_router;
