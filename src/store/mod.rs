//! Relational store abstraction for documents, versions, and sections.
//!
//! The [`DocumentStore`] trait is the narrow persistence contract the
//! ingestion pipeline needs, plus the read side used by the CLI:
//!
//! | Operation | Used by |
//! |-----------|---------|
//! | `create_document` / `get_document` | CLI (`ingest`, `show`, `chat`) |
//! | `insert_version` / `get_version` | pipeline, CLI |
//! | `insert_sections` / `list_sections` | pipeline (one batch per version), CLI |
//! | `mark_version_processed` / `mark_document_ready` | pipeline finalize step |
//! | `insert_flashcards` / `list_flashcards` | generation phase, CLI |
//!
//! Writes are not wrapped in a cross-call transaction; the pipeline relies
//! on write ordering (version, then sections, then the status flip) so a
//! document only points at a version once its sections exist.
//!
//! Implementations must be `Send + Sync`. See [`SqliteDocumentStore`] and
//! [`InMemoryDocumentStore`].

mod memory;
mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, DocumentSection, DocumentVersion, Flashcard, FlashcardDraft, NewDocumentSection,
    NewDocumentVersion,
};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a `pending` document row.
    async fn create_document(&self, id: &str, user_id: &str, title: &str) -> Result<Document>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Insert a new, unprocessed version row.
    async fn insert_version(&self, version: &NewDocumentVersion) -> Result<DocumentVersion>;

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>>;

    /// Insert all sections of a version as one batch. All rows land or none do.
    async fn insert_sections(
        &self,
        version_id: &str,
        sections: &[NewDocumentSection],
    ) -> Result<Vec<DocumentSection>>;

    /// Sections of a version in reading order.
    async fn list_sections(&self, version_id: &str) -> Result<Vec<DocumentSection>>;

    /// Stamp `processed_at` on a version.
    async fn mark_version_processed(&self, version_id: &str) -> Result<()>;

    /// Flip the document to `ready` and point it at `version_id`.
    async fn mark_document_ready(&self, document_id: &str, version_id: &str) -> Result<()>;

    async fn insert_flashcards(
        &self,
        section_id: &str,
        cards: &[FlashcardDraft],
    ) -> Result<Vec<Flashcard>>;

    async fn list_flashcards(&self, section_id: &str) -> Result<Vec<Flashcard>>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
