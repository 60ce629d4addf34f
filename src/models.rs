//! Core data models used throughout studydeck.
//!
//! These types represent the jobs, document versions, and sections that
//! flow through the ingestion pipeline, plus the flashcards produced by the
//! optional generation phase.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the text of an ingestion job comes from.
///
/// A job carries exactly one source: either an object in blob storage or
/// text supplied inline by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Object { bucket: String, path: String },
    Inline { text: String },
}

/// Input contract for one ingestion run. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub document_id: String,
    pub user_id: String,
    pub contact_email: Option<String>,
    pub title: String,
    pub filename: String,
    pub source: JobSource,
    pub page_count: Option<u32>,
    pub checksum: Option<String>,
}

/// Wire shape of a job as it arrives from the worker queue.
///
/// `bucket`/`path` and `text` are flat optional fields here; converting
/// into an [`IngestionJob`] enforces that exactly one source is present.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobPayload {
    pub document_id: String,
    pub user_id: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    pub title: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl TryFrom<JobPayload> for IngestionJob {
    type Error = anyhow::Error;

    fn try_from(p: JobPayload) -> Result<Self> {
        let source = match (p.bucket, p.path, p.text) {
            (Some(bucket), Some(path), None) => JobSource::Object { bucket, path },
            (None, None, Some(text)) => JobSource::Inline { text },
            (_, _, Some(_)) => {
                bail!("job {}: object path and inline text are mutually exclusive", p.document_id)
            }
            (Some(_), None, None) | (None, Some(_), None) => {
                bail!("job {}: object source needs both bucket and path", p.document_id)
            }
            (None, None, None) => {
                bail!("job {}: neither object path nor inline text supplied", p.document_id)
            }
        };

        let filename = match (&p.filename, &source) {
            (Some(f), _) => f.clone(),
            (None, JobSource::Object { path, .. }) => {
                path.rsplit('/').next().unwrap_or(path).to_string()
            }
            (None, JobSource::Inline { .. }) => format!("{}.txt", p.title),
        };

        Ok(IngestionJob {
            document_id: p.document_id,
            user_id: p.user_id,
            contact_email: p.contact_email,
            title: p.title,
            filename,
            source,
            page_count: p.page_count,
            checksum: p.checksum,
        })
    }
}

impl IngestionJob {
    /// Storage locator for the version row, or `None` when text was inline.
    pub fn storage_locator(&self) -> (Option<&str>, Option<&str>) {
        match &self.source {
            JobSource::Object { bucket, path } => (Some(bucket), Some(path)),
            JobSource::Inline { .. } => (None, None),
        }
    }
}

/// Lifecycle status of a parent document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            other => bail!("unknown document status: '{}'", other),
        }
    }
}

/// Parent document row. Owned by the application layer; the pipeline only
/// moves its status and current-version pointer.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: DocumentStatus,
    pub current_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Version row before insertion.
#[derive(Debug, Clone)]
pub struct NewDocumentVersion {
    pub document_id: String,
    pub storage_bucket: Option<String>,
    pub storage_path: Option<String>,
    pub page_count: u32,
    pub raw_text: String,
    pub checksum: String,
}

/// Append-only snapshot of a document's extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    pub storage_bucket: Option<String>,
    pub storage_path: Option<String>,
    pub page_count: u32,
    pub raw_text: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// In-memory section produced and reshaped by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDraft {
    pub heading: String,
    pub content: String,
}

impl SectionDraft {
    pub fn new(heading: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            content: content.into(),
        }
    }

    /// Content length in characters.
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Finalized section ready for the batch insert.
#[derive(Debug, Clone)]
pub struct NewDocumentSection {
    pub order_index: i64,
    pub heading: String,
    pub content: String,
    pub content_hash: String,
}

/// Persisted section of a document version.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSection {
    pub id: String,
    pub version_id: String,
    pub order_index: i64,
    pub heading: String,
    pub content: String,
    pub content_hash: String,
}

/// A generated question/answer pair before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlashcardDraft {
    pub front: String,
    pub back: String,
}

/// Persisted flashcard belonging to one section.
#[derive(Debug, Clone, Serialize)]
pub struct Flashcard {
    pub id: String,
    pub section_id: String,
    pub order_index: i64,
    pub front: String,
    pub back: String,
}

/// Result of a successful ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub version_id: String,
    pub sections_count: usize,
    pub flashcards_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> JobPayload {
        JobPayload {
            document_id: "doc-1".to_string(),
            user_id: "user-1".to_string(),
            contact_email: None,
            title: "Biology".to_string(),
            filename: None,
            bucket: None,
            path: None,
            text: None,
            page_count: None,
            checksum: None,
        }
    }

    #[test]
    fn payload_with_inline_text_converts() {
        let mut p = payload();
        p.text = Some("hello".to_string());
        let job = IngestionJob::try_from(p).unwrap();
        assert_eq!(
            job.source,
            JobSource::Inline {
                text: "hello".to_string()
            }
        );
        assert_eq!(job.filename, "Biology.txt");
        assert_eq!(job.storage_locator(), (None, None));
    }

    #[test]
    fn payload_with_object_converts_and_derives_filename() {
        let mut p = payload();
        p.bucket = Some("uploads".to_string());
        p.path = Some("user-1/notes/cells.pdf".to_string());
        let job = IngestionJob::try_from(p).unwrap();
        assert_eq!(job.filename, "cells.pdf");
        assert_eq!(
            job.storage_locator(),
            (Some("uploads"), Some("user-1/notes/cells.pdf"))
        );
    }

    #[test]
    fn payload_with_both_sources_rejected() {
        let mut p = payload();
        p.bucket = Some("uploads".to_string());
        p.path = Some("a.pdf".to_string());
        p.text = Some("hello".to_string());
        assert!(IngestionJob::try_from(p).is_err());
    }

    #[test]
    fn payload_with_no_source_rejected() {
        assert!(IngestionJob::try_from(payload()).is_err());
    }

    #[test]
    fn payload_with_half_object_rejected() {
        let mut p = payload();
        p.bucket = Some("uploads".to_string());
        assert!(IngestionJob::try_from(p).is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(DocumentStatus::parse("archived").is_err());
    }
}
