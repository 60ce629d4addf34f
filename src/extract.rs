//! Text acquisition for ingestion jobs.
//!
//! Resolves a job's source into plain UTF-8 text, a page count, and a
//! SHA-256 checksum:
//!
//! - **Inline** text is used as given. The checksum covers the exact string.
//! - **Object** sources are fetched from the [`BlobStore`]. PDFs (by `.pdf`
//!   extension or `%PDF-` magic) are extracted page by page with
//!   `pdf-extract`; anything else is decoded as UTF-8 (lossy). The checksum
//!   covers the fetched bytes.
//!
//! A precomputed checksum on the job wins over the computed one. Empty text
//! after extraction is an error: there is nothing to segment.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{IngestionJob, JobSource};
use crate::storage::BlobStore;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("no extractable text in {0}")]
    Empty(String),
}

/// Text plus the metadata recorded on the document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredText {
    pub text: String,
    pub page_count: u32,
    pub checksum: String,
}

pub async fn acquire_text(job: &IngestionJob, blobs: &dyn BlobStore) -> Result<AcquiredText> {
    let acquired = match &job.source {
        JobSource::Inline { text } => AcquiredText {
            text: text.clone(),
            page_count: job.page_count.unwrap_or(0),
            checksum: sha256_hex(text.as_bytes()),
        },
        JobSource::Object { bucket, path } => {
            let bytes = blobs
                .fetch(bucket, path)
                .await
                .with_context(|| format!("Failed to download {}/{}", bucket, path))?;
            let checksum = sha256_hex(&bytes);

            if is_pdf(&job.filename, &bytes) {
                let pages = extract_pdf_pages(&bytes)?;
                AcquiredText {
                    text: pages.join("\n\n"),
                    page_count: pages.len() as u32,
                    checksum,
                }
            } else {
                AcquiredText {
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                    page_count: job.page_count.unwrap_or(0),
                    checksum,
                }
            }
        }
    };

    if acquired.text.trim().is_empty() {
        return Err(ExtractError::Empty(job.filename.clone()).into());
    }

    Ok(AcquiredText {
        checksum: job.checksum.clone().unwrap_or(acquired.checksum),
        ..acquired
    })
}

/// `.pdf` extension (case-insensitive) or `%PDF-` magic bytes.
pub fn is_pdf(filename: &str, bytes: &[u8]) -> bool {
    filename.to_lowercase().ends_with(".pdf") || bytes.starts_with(b"%PDF-")
}

/// Plain text of each page, in order.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapBlobs(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl BlobStore for MapBlobs {
        async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
            self.0
                .get(&format!("{}/{}", bucket, path))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such object"))
        }
    }

    fn job(source: JobSource, filename: &str) -> IngestionJob {
        IngestionJob {
            document_id: "doc-1".to_string(),
            user_id: "user-1".to_string(),
            contact_email: None,
            title: "Notes".to_string(),
            filename: filename.to_string(),
            source,
            page_count: None,
            checksum: None,
        }
    }

    fn inline(text: &str) -> JobSource {
        JobSource::Inline {
            text: text.to_string(),
        }
    }

    fn empty_blobs() -> MapBlobs {
        MapBlobs(HashMap::new())
    }

    #[tokio::test]
    async fn inline_text_checksum_and_default_page_count() {
        let got = acquire_text(&job(inline("hello world"), "notes.txt"), &empty_blobs())
            .await
            .unwrap();
        assert_eq!(got.text, "hello world");
        assert_eq!(got.page_count, 0);
        assert_eq!(
            got.checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn inline_uses_supplied_page_count_and_checksum() {
        let mut j = job(inline("hello world"), "notes.txt");
        j.page_count = Some(7);
        j.checksum = Some("precomputed".to_string());
        let got = acquire_text(&j, &empty_blobs()).await.unwrap();
        assert_eq!(got.page_count, 7);
        assert_eq!(got.checksum, "precomputed");
    }

    #[tokio::test]
    async fn object_text_file_is_decoded() {
        let mut map = HashMap::new();
        map.insert("b/u/notes.md".to_string(), b"# Title\nbody".to_vec());
        let source = JobSource::Object {
            bucket: "b".to_string(),
            path: "u/notes.md".to_string(),
        };
        let got = acquire_text(&job(source, "notes.md"), &MapBlobs(map))
            .await
            .unwrap();
        assert_eq!(got.text, "# Title\nbody");
        assert_eq!(got.checksum, sha256_hex(b"# Title\nbody"));
    }

    #[tokio::test]
    async fn missing_object_fails() {
        let source = JobSource::Object {
            bucket: "b".to_string(),
            path: "nope.txt".to_string(),
        };
        let err = acquire_text(&job(source, "nope.txt"), &empty_blobs())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("b/nope.txt"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let err = acquire_text(&job(inline("  \n "), "blank.txt"), &empty_blobs())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ExtractError>().is_some());
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_error() {
        let mut map = HashMap::new();
        map.insert("b/x.pdf".to_string(), b"%PDF-1.4 garbage".to_vec());
        let source = JobSource::Object {
            bucket: "b".to_string(),
            path: "x.pdf".to_string(),
        };
        assert!(acquire_text(&job(source, "x.pdf"), &MapBlobs(map)).await.is_err());
    }

    #[test]
    fn pdf_detection() {
        assert!(is_pdf("Lecture.PDF", b""));
        assert!(is_pdf("upload.bin", b"%PDF-1.7\n"));
        assert!(!is_pdf("notes.txt", b"plain"));
    }
}
