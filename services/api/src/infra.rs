use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use payables_engine::decisions::{Condition, LogicalOperator, Operator, Policy};
use payables_engine::ingestion::{
    DocumentExtractor, DocumentType, Extraction, ExtractionError, IngestionItem,
};
use payables_engine::notifications::{ListenerError, SyncEvent, SyncEventKind, SyncListener};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes job milestones to the service log.
#[derive(Debug, Default)]
pub(crate) struct LogListener;

impl SyncListener for LogListener {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError> {
        info!(
            job_id = %event.job_id,
            kind = ?event.kind,
            source = ?event.source,
            status = %event.status,
            "sync event"
        );
        Ok(())
    }
}

/// Prints job milestones for the CLI demo.
#[derive(Debug, Default)]
pub(crate) struct ConsoleListener;

impl SyncListener for ConsoleListener {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError> {
        match event.kind {
            SyncEventKind::SyncStarted => {
                println!("  [bus] {} started ({:?})", event.job_id, event.source)
            }
            SyncEventKind::SyncCompleted => {
                println!("  [bus] {} completed -> {}", event.job_id, event.status)
            }
        }
        Ok(())
    }
}

/// Stand-in for the OCR pipeline: classifies by filename and takes the stem as the document id.
#[derive(Debug, Default)]
pub(crate) struct FilenameExtractor;

impl DocumentExtractor for FilenameExtractor {
    fn extract(&self, item: &IngestionItem) -> Result<Extraction, ExtractionError> {
        if item.payload.is_empty() {
            return Err(ExtractionError::Unreadable(format!(
                "{} has no content",
                item.filename
            )));
        }

        let lower = item.filename.to_ascii_lowercase();
        let (stem, extension) = lower.rsplit_once('.').unwrap_or((lower.as_str(), ""));
        if !matches!(extension, "pdf" | "png" | "jpg" | "jpeg" | "tif" | "tiff") {
            return Err(ExtractionError::UnsupportedFormat(item.filename.clone()));
        }

        let document_type = if stem.starts_with("inv") {
            DocumentType::Invoice
        } else if stem.starts_with("po") {
            DocumentType::PurchaseOrder
        } else if stem.starts_with("rcpt") || stem.starts_with("receipt") {
            DocumentType::Receipt
        } else if stem.starts_with("stmt") || stem.starts_with("statement") {
            DocumentType::Statement
        } else if stem.starts_with("contract") {
            DocumentType::Contract
        } else {
            DocumentType::Other
        };

        let extracted_id = match document_type {
            DocumentType::Other => None,
            _ => Some(stem.to_ascii_uppercase()),
        };

        Ok(Extraction {
            document_type,
            extracted_id,
        })
    }
}

/// Collections playbook evaluated in order; the first match decides the action.
pub(crate) fn collections_policy_set(due_soon_days: u32) -> Vec<Policy> {
    vec![
        Policy::new(
            "escalate-dispute",
            "Route disputed invoices to AP review",
            LogicalOperator::Or,
            "route_to_ap_review",
        )
        .with_condition(Condition::new(
            "invoice.memo",
            Operator::Contains,
            "disputed",
        ))
        .with_condition(Condition::new(
            "invoice.status",
            Operator::Equals,
            "disputed",
        )),
        Policy::new(
            "overdue-enterprise",
            "Escalate overdue enterprise accounts",
            LogicalOperator::And,
            "assign_collections_agent",
        )
        .with_condition(Condition::new(
            "invoice.status",
            Operator::Equals,
            "overdue",
        ))
        .with_condition(Condition::new(
            "customer.segment",
            Operator::Equals,
            "Enterprise",
        )),
        Policy::new(
            "due-soon-reminder",
            "Remind customers before the due date",
            LogicalOperator::And,
            "send_reminder",
        )
        .with_condition(Condition::new("invoice.status", Operator::Equals, "open"))
        .with_condition(Condition::new(
            "invoice.due_date",
            Operator::IsWithinNextDays,
            due_soon_days,
        )),
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use payables_engine::decisions::{PolicyEngine, Record};

    #[test]
    fn filename_extractor_classifies_known_prefixes() {
        let extraction = FilenameExtractor
            .extract(&IngestionItem::new("INV-2044.pdf", b"%PDF".to_vec()))
            .expect("invoice");
        assert_eq!(extraction.document_type, DocumentType::Invoice);
        assert_eq!(extraction.extracted_id.as_deref(), Some("INV-2044"));

        let err = FilenameExtractor
            .extract(&IngestionItem::new("aging.xlsx", b"PK".to_vec()))
            .expect_err("spreadsheets are not scanned");
        assert_eq!(err, ExtractionError::UnsupportedFormat("aging.xlsx".to_string()));
    }

    #[test]
    fn playbook_is_valid_and_respects_the_window() {
        let today = parse_date("2026-10-16").expect("date");
        let policies = collections_policy_set(5);
        for policy in &policies {
            policy.validate().expect("built-in policies are valid");
        }

        let engine = PolicyEngine::new(today);
        let record = Record::new()
            .with_field("invoice.status", "open")
            .with_field("invoice.memo", "net 30")
            .with_field("customer.segment", "SMB")
            .with_field("invoice.due_date", today + Duration::days(5));
        let decision = engine.decide(&policies, &record).expect("decides");
        assert_eq!(decision.action_type.as_deref(), Some("send_reminder"));

        let later = record.with_field("invoice.due_date", today + Duration::days(6));
        let decision = engine.decide(&policies, &later).expect("decides");
        assert_eq!(decision.action_type, None);
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("16/10/2026").is_err());
    }
}
