use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::ingestion::{
    DocumentExtractor, DocumentType, Extraction, ExtractionError, IngestionItem, JobId,
    JobOrchestrator, JobResult,
};
use crate::notifications::{
    ListenerError, NotificationBus, SyncEvent, SyncEventKind, SyncListener,
};

/// Listener that keeps every event it sees.
#[derive(Default)]
pub(super) struct EventLog {
    events: Mutex<Vec<SyncEvent>>,
}

impl SyncListener for EventLog {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError> {
        self.events.lock().expect("event log poisoned").push(event.clone());
        Ok(())
    }
}

impl EventLog {
    pub(super) fn for_job(&self, job_id: &JobId) -> Vec<SyncEventKind> {
        self.events
            .lock()
            .expect("event log poisoned")
            .iter()
            .filter(|event| &event.job_id == job_id)
            .map(|event| event.kind)
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.events.lock().expect("event log poisoned").len()
    }
}

pub(super) fn orchestrator() -> JobOrchestrator {
    JobOrchestrator::new(Arc::new(NotificationBus::new()))
}

pub(super) fn invoice(filename: &str) -> JobResult {
    JobResult::success(
        filename,
        DocumentType::Invoice,
        Some(format!("INV-{}", filename.len())),
        "parsed invoice",
    )
}

pub(super) fn unreadable(filename: &str) -> JobResult {
    JobResult::failure(filename, "scan too blurry to read")
}

/// Extractor that classifies by filename prefix and refuses anything it does not recognise.
pub(super) struct PrefixExtractor;

impl DocumentExtractor for PrefixExtractor {
    fn extract(&self, item: &IngestionItem) -> Result<Extraction, ExtractionError> {
        if item.payload.is_empty() {
            return Err(ExtractionError::Unreadable(format!("{} is empty", item.filename)));
        }

        let document_type = if item.filename.starts_with("inv") {
            DocumentType::Invoice
        } else if item.filename.starts_with("po") {
            DocumentType::PurchaseOrder
        } else {
            return Err(ExtractionError::UnsupportedFormat(item.filename.clone()));
        };

        Ok(Extraction {
            document_type,
            extracted_id: item.filename.split('.').next().map(str::to_uppercase),
        })
    }
}

pub(super) async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let payload = serde_json::from_slice(&bytes).expect("json payload");
    (status, payload)
}
