use serde::{Deserialize, Serialize};

use super::job::{DocumentType, JobResult};

/// One file handed over by the upload or sync collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionItem {
    pub filename: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl IngestionItem {
    pub fn new(filename: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            payload: payload.into(),
        }
    }
}

/// Structured output of the external extraction pipeline for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub document_type: DocumentType,
    pub extracted_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("document could not be read: {0}")]
    Unreadable(String),
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to the OCR/extraction pipeline. Implementations live outside this crate.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, item: &IngestionItem) -> Result<Extraction, ExtractionError>;
}

pub(crate) fn result_for(
    item: &IngestionItem,
    extracted: Result<Extraction, ExtractionError>,
) -> JobResult {
    match extracted {
        Ok(Extraction {
            document_type,
            extracted_id,
        }) => {
            let message = match &extracted_id {
                Some(id) => format!("extracted {} {id}", document_type.label()),
                None => format!("extracted {} without an identifier", document_type.label()),
            };
            JobResult::success(item.filename.clone(), document_type, extracted_id, message)
        }
        Err(err) => JobResult::failure(item.filename.clone(), err.to_string()),
    }
}
